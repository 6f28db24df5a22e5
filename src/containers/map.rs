// ============================================================================
// loadout-observables - Observable Map
// A key-unique mapping with per-key and global observer registries
// ============================================================================
//
// The notification-scope flag selects, per event and exclusively, whether a
// mutation reaches the mutated key's observers or the global observers -
// never both. Duplicate `add` and keyed reads of absent keys are hard
// errors, raised at the call site.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::error::KeyError;
use crate::core::observers::{ObserverKey, ObserverList, OwnerId};
use crate::core::types::{
    AnyReaction, AnySubject, BatchMember, Dependents, MapCallback, UpdateType,
};
use crate::reactivity::tracking::{assert_not_in_compute, mark_dependents, track_read};

// =============================================================================
// NOTIFICATION SCOPE
// =============================================================================

/// The exclusive switch selecting which observer registry fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationScope {
    /// Only the mutated key's observers fire (the default).
    #[default]
    PerKey,
    /// Only the global observers fire.
    Global,
}

// =============================================================================
// PENDING CHANGE (batch coalescing)
// =============================================================================

struct PendingChange<K, V> {
    key: K,
    kind: UpdateType,
    previous: Option<V>,
    current: Option<V>,
}

// =============================================================================
// MAP INNER
// =============================================================================

/// The shared state behind `ObservableMap<K, V>`.
pub struct MapInner<K, V> {
    flags: Cell<u32>,

    /// Backing storage
    entries: RefCell<HashMap<K, V>>,

    /// Per-key observer lists. Rc so a list handle can be cloned out before
    /// dispatch - a callback may register new per-key observers mid-event.
    key_observers: RefCell<HashMap<K, Rc<ObserverList<MapCallback<K, V>>>>>,

    /// Global observer list
    global_observers: ObserverList<MapCallback<K, V>>,

    /// Which registry fires, evaluated per event
    scope: Cell<NotificationScope>,

    /// Computed values reading this map
    dependents: Dependents,

    /// Coalesced event while enlisted in a batch
    pending: RefCell<Option<PendingChange<K, V>>>,
}

impl<K, V> MapInner<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Route one event: defer while suppressed, otherwise dispatch now.
    fn emit(&self, key: K, previous: Option<V>, current: Option<V>, kind: UpdateType) {
        if self.flags.get() & SUPPRESSED != 0 {
            let mut pending = self.pending.borrow_mut();
            match pending.as_mut() {
                Some(change) => {
                    change.key = key;
                    change.kind = kind;
                    change.current = current;
                }
                None => {
                    *pending = Some(PendingChange {
                        key,
                        kind,
                        previous,
                        current,
                    });
                }
            }
        } else {
            self.dispatch(&key, previous.as_ref(), current.as_ref(), kind);
        }
    }

    /// Invoke the scope-selected observers for one event.
    fn dispatch(&self, key: &K, previous: Option<&V>, current: Option<&V>, kind: UpdateType) {
        match self.scope.get() {
            NotificationScope::PerKey => {
                // Clone the list handle out before invoking anything.
                let list = self.key_observers.borrow().get(key).cloned();
                if let Some(list) = list {
                    Self::dispatch_to(&list, key, previous, current, kind);
                }
            }
            NotificationScope::Global => {
                Self::dispatch_to(&self.global_observers, key, previous, current, kind);
            }
        }
    }

    fn dispatch_to(
        list: &ObserverList<MapCallback<K, V>>,
        key: &K,
        previous: Option<&V>,
        current: Option<&V>,
        kind: UpdateType,
    ) {
        match kind {
            UpdateType::Removed => {
                list.notify_reverse(&mut |cb| cb(key, previous, current, kind))
            }
            _ => list.notify_forward(&mut |cb| cb(key, previous, current, kind)),
        }
    }
}

impl<K: 'static, V: 'static> AnySubject for MapInner<K, V> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn dependent_count(&self) -> usize {
        self.dependents.count()
    }

    fn add_dependent(&self, reaction: Weak<dyn AnyReaction>) {
        self.dependents.add(reaction);
    }

    fn remove_dependent(&self, reaction: &Rc<dyn AnyReaction>) {
        self.dependents.remove(reaction);
    }

    fn cleanup_dead_dependents(&self) {
        self.dependents.cleanup_dead();
    }

    fn for_each_dependent(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool) {
        self.dependents.for_each(f);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K, V> BatchMember for MapInner<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn begin_suppression(&self) -> bool {
        if self.flags.get() & SUPPRESSED != 0 {
            return false;
        }
        self.flags.set(self.flags.get() | SUPPRESSED);
        *self.pending.borrow_mut() = None;
        true
    }

    fn flush(&self) {
        self.flags.set(self.flags.get() & !SUPPRESSED);

        let pending = self.pending.borrow_mut().take();
        if let Some(change) = pending {
            self.dispatch(
                &change.key,
                change.previous.as_ref(),
                change.current.as_ref(),
                change.kind,
            );
        }
    }
}

// =============================================================================
// OBSERVABLE MAP
// =============================================================================

/// A key-unique observable mapping.
///
/// Two observer registries exist side by side: per-key lists and a global
/// list. The [`NotificationScope`] flag picks exactly one of them for every
/// event; the default is per-key.
///
/// # Example
///
/// ```
/// use loadout_observables::map;
///
/// let stats = map();
/// stats.add("strength".to_string(), 10).unwrap();
///
/// stats.observe_key("strength".to_string(), |_key, prev, cur, _kind| {
///     println!("strength {:?} -> {:?}", prev, cur);
/// });
///
/// stats.set(&"strength".to_string(), 12).unwrap();
/// ```
#[derive(Clone)]
pub struct ObservableMap<K, V> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> ObservableMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Create an empty map (per-key scope).
    pub fn new() -> Self {
        Self::from_entries(HashMap::new())
    }

    /// Create a map over existing entries.
    pub fn from_entries(entries: HashMap<K, V>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                flags: Cell::new(MAP | CLEAN),
                entries: RefCell::new(entries),
                key_observers: RefCell::new(HashMap::new()),
                global_observers: ObserverList::new(),
                scope: Cell::new(NotificationScope::default()),
                dependents: Dependents::new(),
                pending: RefCell::new(None),
            }),
        }
    }

    // =========================================================================
    // SCOPE FLAG
    // =========================================================================

    /// Select which observer registry fires for subsequent events.
    pub fn set_notification_scope(&self, scope: NotificationScope) {
        self.inner.scope.set(scope);
    }

    /// The currently selected scope
    pub fn notification_scope(&self) -> NotificationScope {
        self.inner.scope.get()
    }

    // =========================================================================
    // READS (all tracked)
    // =========================================================================

    /// Get the value for `key` (cloning).
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the key is absent.
    pub fn get(&self, key: &K) -> Result<V, KeyError> {
        self.try_get(key).ok_or(KeyError::MissingKey)
    }

    /// Get the value for `key`, or None when absent.
    pub fn try_get(&self, key: &K) -> Option<V> {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.entries.borrow().get(key).cloned()
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &K) -> bool {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.entries.borrow().contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.entries.borrow().len()
    }

    /// True when the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the keys.
    pub fn keys(&self) -> Vec<K> {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Snapshot the values.
    pub fn values(&self) -> Vec<V> {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.entries.borrow().values().cloned().collect()
    }

    /// Snapshot the entries into a plain HashMap.
    pub fn to_map(&self) -> HashMap<K, V> {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.entries.borrow().clone()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Insert a new entry, emitting `Added`.
    ///
    /// # Errors
    ///
    /// [`KeyError::DuplicateKey`] when the key is already present; the map
    /// is not modified.
    pub fn add(&self, key: K, value: V) -> Result<(), KeyError> {
        assert_not_in_compute();

        {
            let mut entries = self.inner.entries.borrow_mut();
            if entries.contains_key(&key) {
                return Err(KeyError::DuplicateKey);
            }
            entries.insert(key.clone(), value.clone());
        }

        self.inner.emit(key, None, Some(value), UpdateType::Added);
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
        Ok(())
    }

    /// Replace the value of an existing entry, emitting `Updated` with
    /// `(previous, current)` — on every assignment, equal or not.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the key is absent.
    pub fn set(&self, key: &K, value: V) -> Result<(), KeyError> {
        assert_not_in_compute();

        let previous = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get_mut(key) {
                Some(slot) => std::mem::replace(slot, value.clone()),
                None => return Err(KeyError::MissingKey),
            }
        };

        self.inner
            .emit(key.clone(), Some(previous), Some(value), UpdateType::Updated);
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
        Ok(())
    }

    /// Remove an entry, emitting `Removed`. Returns whether the key existed.
    pub fn remove(&self, key: &K) -> bool {
        assert_not_in_compute();

        let removed = self.inner.entries.borrow_mut().remove(key);
        match removed {
            Some(previous) => {
                self.inner
                    .emit(key.clone(), Some(previous), None, UpdateType::Removed);
                mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
                true
            }
            None => false,
        }
    }

    /// Remove every entry, emitting `Removed` once per entry.
    ///
    /// Entry order is arbitrary (the mapping is insertion-order-irrelevant).
    /// Observer entries are re-validated before every invocation, so a
    /// callback that unsubscribes mid-clear cannot corrupt the iteration.
    pub fn clear(&self) {
        assert_not_in_compute();

        let keys: Vec<K> = self.inner.entries.borrow().keys().cloned().collect();

        for key in keys {
            let removed = self.inner.entries.borrow_mut().remove(&key);
            if let Some(previous) = removed {
                self.inner
                    .emit(key, Some(previous), None, UpdateType::Removed);
            }
        }

        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }

    /// Force a synthetic `Updated` notification carrying the current value
    /// on both sides, to prime a late-joining observer.
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingKey`] when the key is absent.
    pub fn invoke_update(&self, key: &K) -> Result<(), KeyError> {
        let current = self
            .inner
            .entries
            .borrow()
            .get(key)
            .cloned()
            .ok_or(KeyError::MissingKey)?;

        self.inner.emit(
            key.clone(),
            Some(current.clone()),
            Some(current),
            UpdateType::Updated,
        );
        Ok(())
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Append a global observer. Fires only while the scope is `Global`.
    pub fn observe(
        &self,
        cb: impl Fn(&K, Option<&V>, Option<&V>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.inner
            .global_observers
            .subscribe(Rc::new(cb) as Rc<MapCallback<K, V>>, None)
    }

    /// Append a global observer registered under an owner token.
    pub fn observe_owned(
        &self,
        owner: OwnerId,
        cb: impl Fn(&K, Option<&V>, Option<&V>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.inner
            .global_observers
            .subscribe(Rc::new(cb) as Rc<MapCallback<K, V>>, Some(owner))
    }

    /// Append an observer for one key. Fires only while the scope is
    /// `PerKey`, and only for that key's events.
    pub fn observe_key(
        &self,
        key: K,
        cb: impl Fn(&K, Option<&V>, Option<&V>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.key_list(key)
            .subscribe(Rc::new(cb) as Rc<MapCallback<K, V>>, None)
    }

    /// Append a per-key observer registered under an owner token.
    pub fn observe_key_owned(
        &self,
        key: K,
        owner: OwnerId,
        cb: impl Fn(&K, Option<&V>, Option<&V>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.key_list(key)
            .subscribe(Rc::new(cb) as Rc<MapCallback<K, V>>, Some(owner))
    }

    fn key_list(&self, key: K) -> Rc<ObserverList<MapCallback<K, V>>> {
        self.inner
            .key_observers
            .borrow_mut()
            .entry(key)
            .or_default()
            .clone()
    }

    /// Remove the observer with the given handle, wherever it lives.
    pub fn stop_observing(&self, key: ObserverKey) -> bool {
        if self.inner.global_observers.unsubscribe(key) {
            return true;
        }
        let lists: Vec<Rc<ObserverList<MapCallback<K, V>>>> =
            self.inner.key_observers.borrow().values().cloned().collect();
        lists.iter().any(|list| list.unsubscribe(key))
    }

    /// Drop **all** observers registered for one key.
    /// Returns how many were removed.
    pub fn stop_observing_key(&self, key: &K) -> usize {
        match self.inner.key_observers.borrow_mut().remove(key) {
            Some(list) => list.len(),
            None => 0,
        }
    }

    /// Remove all observers (global and per-key), or only those registered
    /// under `owner`.
    pub fn stop_observing_all(&self, owner: Option<OwnerId>) {
        match owner {
            Some(owner) => {
                self.inner.global_observers.remove_owner(owner);
                let lists: Vec<Rc<ObserverList<MapCallback<K, V>>>> =
                    self.inner.key_observers.borrow().values().cloned().collect();
                for list in lists {
                    list.remove_owner(owner);
                }
            }
            None => {
                self.inner.global_observers.clear();
                self.inner.key_observers.borrow_mut().clear();
            }
        }
    }

    /// Number of global observers
    pub fn global_observer_count(&self) -> usize {
        self.inner.global_observers.len()
    }

    /// Number of observers registered for one key
    pub fn key_observer_count(&self, key: &K) -> usize {
        self.inner
            .key_observers
            .borrow()
            .get(key)
            .map_or(0, |list| list.len())
    }

    // =========================================================================
    // GRAPH / BATCH ACCESS
    // =========================================================================

    /// This map as a type-erased dependency subject.
    pub fn as_subject(&self) -> Rc<dyn AnySubject> {
        self.inner.clone()
    }

    /// This map as a type-erased batch member.
    pub fn as_batch_member(&self) -> Rc<dyn BatchMember> {
        self.inner.clone()
    }

    /// Replace the backing storage without notifying observers. Dependents
    /// are still marked. Used by resolver rebinds.
    pub(crate) fn replace_entries_silent(&self, entries: HashMap<K, V>) {
        *self.inner.entries.borrow_mut() = entries;
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }
}

impl<K, V> Default for ObservableMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ObservableMap<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + 'static,
    V: Clone + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableMap")
            .field("entries", &*self.inner.entries.borrow())
            .field("scope", &self.inner.scope.get())
            .finish()
    }
}

/// Create an empty observable map.
pub fn map<K, V>() -> ObservableMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    ObservableMap::new()
}

// =============================================================================
// TESTS
// =============================================================================
