// ============================================================================
// loadout-observables - Map Resolver
// Mirrors an externally-owned HashMap of different key/value types
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::containers::map::{NotificationScope, ObservableMap};
use crate::core::error::KeyError;
use crate::core::observers::{ObserverKey, OwnerId};
use crate::core::types::UpdateType;

/// An [`ObservableMap`] kept entry-for-entry in sync with an
/// externally-owned `HashMap` of different key and value types.
///
/// Conversions run pairwise: the inbound function maps an origin entry to a
/// local entry, the outbound function maps back. Origin keys are expected to
/// convert injectively; collisions during a rebuild resolve last-wins.
/// Writes go origin-first, with duplicate/missing-key validation on the
/// mirror before either replica is touched.
pub struct MapResolver<K, V, OK, OV> {
    local: ObservableMap<K, V>,
    origin: Rc<RefCell<HashMap<OK, OV>>>,
    from_origin: Rc<dyn Fn(&OK, &OV) -> (K, V)>,
    to_origin: Rc<dyn Fn(&K, &V) -> (OK, OV)>,
}

impl<K, V, OK, OV> MapResolver<K, V, OK, OV>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    OK: Eq + Hash + Clone + 'static,
    OV: Clone + 'static,
{
    /// Create a resolver over an origin map, seeding the mirror through the
    /// inbound conversion.
    pub fn new(
        origin: Rc<RefCell<HashMap<OK, OV>>>,
        from_origin: impl Fn(&OK, &OV) -> (K, V) + 'static,
        to_origin: impl Fn(&K, &V) -> (OK, OV) + 'static,
    ) -> Self {
        let seeded: HashMap<K, V> = origin
            .borrow()
            .iter()
            .map(|(ok, ov)| from_origin(ok, ov))
            .collect();
        Self {
            local: ObservableMap::from_entries(seeded),
            origin,
            from_origin: Rc::new(from_origin),
            to_origin: Rc::new(to_origin),
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Get the mirrored value for a local key.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the key is absent.
    pub fn get(&self, key: &K) -> Result<V, KeyError> {
        self.local.get(key)
    }

    /// Get the mirrored value for a local key, or None.
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.local.try_get(key)
    }

    /// Get the mirrored value addressed by an origin key: looks up the
    /// origin entry, converts it inbound, and reads the mirror under the
    /// resulting local key.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the origin key is absent.
    pub fn get_origin(&self, key: &OK) -> Result<V, KeyError> {
        let origin_value = self
            .origin
            .borrow()
            .get(key)
            .cloned()
            .ok_or(KeyError::MissingKey)?;
        let (local_key, _) = (self.from_origin)(key, &origin_value);
        self.local.get(&local_key)
    }

    /// Whether the mirror contains a local key
    pub fn contains_key(&self, key: &K) -> bool {
        self.local.contains_key(key)
    }

    /// Number of mirrored entries
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// True when the mirror holds no entries
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Snapshot the mirrored keys.
    pub fn keys(&self) -> Vec<K> {
        self.local.keys()
    }

    // =========================================================================
    // MUTATIONS (origin first, then mirror)
    // =========================================================================

    /// Insert through the local types.
    ///
    /// # Errors
    ///
    /// [`KeyError::DuplicateKey`] when the local key is already mirrored;
    /// neither replica is touched.
    pub fn add(&self, key: K, value: V) -> Result<(), KeyError> {
        if self.local.contains_key(&key) {
            return Err(KeyError::DuplicateKey);
        }
        let (origin_key, origin_value) = (self.to_origin)(&key, &value);
        self.origin.borrow_mut().insert(origin_key, origin_value);
        self.local.add(key, value)
    }

    /// Insert through the origin types.
    ///
    /// # Errors
    ///
    /// [`KeyError::DuplicateKey`] when the converted local key is already
    /// mirrored; neither replica is touched.
    pub fn add_origin(&self, key: OK, value: OV) -> Result<(), KeyError> {
        let (local_key, local_value) = (self.from_origin)(&key, &value);
        if self.local.contains_key(&local_key) {
            return Err(KeyError::DuplicateKey);
        }
        self.origin.borrow_mut().insert(key, value);
        self.local.add(local_key, local_value)
    }

    /// Replace an existing entry through the local types.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the local key is absent; neither
    /// replica is touched.
    pub fn set(&self, key: &K, value: V) -> Result<(), KeyError> {
        if !self.local.contains_key(key) {
            return Err(KeyError::MissingKey);
        }
        let (origin_key, origin_value) = (self.to_origin)(key, &value);
        self.origin.borrow_mut().insert(origin_key, origin_value);
        self.local.set(key, value)
    }

    /// Replace an existing entry through the origin types.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the origin key is absent.
    pub fn update_origin(&self, key: &OK, value: OV) -> Result<(), KeyError> {
        if !self.origin.borrow().contains_key(key) {
            return Err(KeyError::MissingKey);
        }
        let (local_key, local_value) = (self.from_origin)(key, &value);
        self.origin.borrow_mut().insert(key.clone(), value);
        self.local.set(&local_key, local_value)
    }

    /// Remove through the local key. Returns whether the entry existed.
    pub fn remove(&self, key: &K) -> bool {
        let Some(value) = self.local.try_get(key) else {
            return false;
        };
        let (origin_key, _) = (self.to_origin)(key, &value);
        self.origin.borrow_mut().remove(&origin_key);
        self.local.remove(key)
    }

    /// Remove through the origin key. Returns whether the entry existed.
    pub fn remove_origin(&self, key: &OK) -> bool {
        let Some(origin_value) = self.origin.borrow().get(key).cloned() else {
            return false;
        };
        let (local_key, _) = (self.from_origin)(key, &origin_value);
        self.origin.borrow_mut().remove(key);
        self.local.remove(&local_key)
    }

    /// Remove every entry from both replicas.
    pub fn clear(&self) {
        self.origin.borrow_mut().clear();
        self.local.clear();
    }

    /// Force a synthetic `Updated` notification for a mirrored key.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the key is absent.
    pub fn invoke_update(&self, key: &K) -> Result<(), KeyError> {
        self.local.invoke_update(key)
    }

    /// Swap the origin and both conversion functions, eagerly rebuilding
    /// the mirror from the new origin. Observer registrations (global and
    /// per-key) are untouched; the rebuild itself fires no observer events.
    pub fn rebind(
        &mut self,
        origin: Rc<RefCell<HashMap<OK, OV>>>,
        from_origin: impl Fn(&OK, &OV) -> (K, V) + 'static,
        to_origin: impl Fn(&K, &V) -> (OK, OV) + 'static,
    ) {
        #[cfg(feature = "tracing")]
        tracing::trace!("map resolver rebind");

        self.from_origin = Rc::new(from_origin);
        self.to_origin = Rc::new(to_origin);

        let rebuilt: HashMap<K, V> = origin
            .borrow()
            .iter()
            .map(|(ok, ov)| (self.from_origin)(ok, ov))
            .collect();
        self.origin = origin;
        self.local.replace_entries_silent(rebuilt);
    }

    // =========================================================================
    // DELEGATED OBSERVER OPERATIONS
    // =========================================================================

    /// Select which observer registry fires for subsequent events.
    pub fn set_notification_scope(&self, scope: NotificationScope) {
        self.local.set_notification_scope(scope);
    }

    /// The currently selected scope
    pub fn notification_scope(&self) -> NotificationScope {
        self.local.notification_scope()
    }

    /// Append a global observer on the mirror.
    pub fn observe(
        &self,
        cb: impl Fn(&K, Option<&V>, Option<&V>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.local.observe(cb)
    }

    /// Append a per-key observer on the mirror.
    pub fn observe_key(
        &self,
        key: K,
        cb: impl Fn(&K, Option<&V>, Option<&V>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.local.observe_key(key, cb)
    }

    /// Remove the observer with the given handle.
    pub fn stop_observing(&self, key: ObserverKey) -> bool {
        self.local.stop_observing(key)
    }

    /// Drop all observers registered for one local key.
    pub fn stop_observing_key(&self, key: &K) -> usize {
        self.local.stop_observing_key(key)
    }

    /// Remove all observers, or only those registered under `owner`.
    pub fn stop_observing_all(&self, owner: Option<OwnerId>) {
        self.local.stop_observing_all(owner)
    }

    /// The mirror map itself (for computed reads or batch enlistment).
    pub fn local(&self) -> &ObservableMap<K, V> {
        &self.local
    }

    /// The current origin handle.
    pub fn origin_handle(&self) -> Rc<RefCell<HashMap<OK, OV>>> {
        self.origin.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================
