// ============================================================================
// loadout-observables - Observer List
// Stable-handle callback registry shared by every container
// ============================================================================
//
// Subscriptions are identified by an opaque key, never by closure identity.
// Dispatch is snapshot-based: the entry list is copied before any callback
// runs, and each entry is re-validated against the live list immediately
// before its invocation. A callback subscribed during a dispatch does not
// see the in-flight event; a callback unsubscribed mid-dispatch (including
// by itself) is neither skipped nor double-invoked.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

// =============================================================================
// HANDLES
// =============================================================================

thread_local! {
    static NEXT_OBSERVER_KEY: Cell<u64> = const { Cell::new(1) };
    static NEXT_OWNER_ID: Cell<u64> = const { Cell::new(1) };
}

/// Opaque subscription handle returned by every `observe` operation.
///
/// Keys are unique across all observer lists on the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverKey(u64);

impl ObserverKey {
    fn next() -> Self {
        NEXT_OBSERVER_KEY.with(|counter| {
            let key = counter.get();
            counter.set(key + 1);
            ObserverKey(key)
        })
    }
}

/// Opaque ownership token for group teardown.
///
/// A view/binding layer allocates one per widget, subscribes with it, and
/// calls `stop_observing_all(Some(owner))` when the widget goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a fresh owner token.
    pub fn new() -> Self {
        NEXT_OWNER_ID.with(|counter| {
            let id = counter.get();
            counter.set(id + 1);
            OwnerId(id)
        })
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// OBSERVER LIST
// =============================================================================

struct Entry<F: ?Sized> {
    key: ObserverKey,
    owner: Option<OwnerId>,
    callback: Rc<F>,
}

/// An ordered list of observer callbacks with stable handles.
///
/// `F` is the unsized callback type, e.g. `dyn Fn(&T, &T)`.
pub struct ObserverList<F: ?Sized> {
    entries: RefCell<Vec<Entry<F>>>,
}

impl<F: ?Sized> ObserverList<F> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Append a callback, returning its handle.
    pub fn subscribe(&self, callback: Rc<F>, owner: Option<OwnerId>) -> ObserverKey {
        let key = ObserverKey::next();
        self.entries.borrow_mut().push(Entry {
            key,
            owner,
            callback,
        });
        key
    }

    /// Remove the callback with the given handle. Returns whether it existed.
    pub fn unsubscribe(&self, key: ObserverKey) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.key != key);
        entries.len() != before
    }

    /// Remove every callback registered under the given owner.
    /// Returns how many were removed.
    pub fn remove_owner(&self, owner: OwnerId) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.owner != Some(owner));
        before - entries.len()
    }

    /// Remove every callback.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when no callback is registered
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether the handle is still registered
    pub fn contains(&self, key: ObserverKey) -> bool {
        self.entries.borrow().iter().any(|entry| entry.key == key)
    }

    /// Copy the current entries for dispatch. Releases the borrow before
    /// any callback can run.
    pub fn snapshot(&self) -> Vec<(ObserverKey, Rc<F>)> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| (entry.key, entry.callback.clone()))
            .collect()
    }

    /// Dispatch in subscription order with re-validation.
    pub fn notify_forward(&self, invoke: &mut dyn FnMut(&F)) {
        for (key, callback) in self.snapshot() {
            if !self.contains(key) {
                continue;
            }
            invoke(&callback);
        }
    }

    /// Dispatch in reverse subscription order with re-validation.
    ///
    /// Removal-type events use this path so a callback that unsubscribes
    /// itself cannot shift entries that are still due to fire.
    pub fn notify_reverse(&self, invoke: &mut dyn FnMut(&F)) {
        for (key, callback) in self.snapshot().into_iter().rev() {
            if !self.contains(key) {
                continue;
            }
            invoke(&callback);
        }
    }
}

impl<F: ?Sized> Default for ObserverList<F> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
