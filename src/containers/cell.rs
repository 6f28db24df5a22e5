// ============================================================================
// loadout-observables - Observable Cell
// A single observable value with an ordered observer list
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::observers::{ObserverKey, ObserverList, OwnerId};
use crate::core::types::{AnyReaction, AnySubject, BatchMember, CellCallback, Dependents};
use crate::reactivity::tracking::{assert_not_in_compute, mark_dependents, track_read};

// =============================================================================
// CELL INNER
// =============================================================================

/// The shared state behind `ObservableCell<T>`.
pub struct CellInner<T> {
    flags: Cell<u32>,

    /// The current value
    value: RefCell<T>,

    /// Ordered (previous, current) change callbacks
    observers: ObserverList<CellCallback<T>>,

    /// Computed values reading this cell
    dependents: Dependents,

    /// First captured previous value while enlisted in a batch
    pending_prev: RefCell<Option<T>>,
}

impl<T: 'static> AnySubject for CellInner<T> {
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

impl<T: Clone + 'static> BatchMember for CellInner<T> {
    fn begin_suppression(&self) -> bool {
        if self.flags.get() & SUPPRESSED != 0 {
            return false;
        }
        self.flags.set(self.flags.get() | SUPPRESSED);
        *self.pending_prev.borrow_mut() = None;
        true
    }

    fn flush(&self) {
        self.flags.set(self.flags.get() & !SUPPRESSED);

        let pending = self.pending_prev.borrow_mut().take();
        if let Some(previous) = pending {
            let current = self.value.borrow().clone();
            self.observers
                .notify_forward(&mut |cb| cb(&previous, &current));
        }
    }
}

// =============================================================================
// OBSERVABLE CELL
// =============================================================================

/// A single observable value.
///
/// Every assignment notifies every registered observer, in subscription
/// order, with `(previous, current)` — including assignments of a value
/// equal to the old one. The contract is "any assignment", not "any change".
///
/// # Example
///
/// ```
/// use loadout_observables::cell;
///
/// let health = cell(100);
/// let key = health.observe(|prev, cur| {
///     println!("hp {} -> {}", prev, cur);
/// });
///
/// health.set(80); // observer sees (100, 80)
/// health.stop_observing(key);
/// ```
#[derive(Clone)]
pub struct ObservableCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T: Clone + 'static> ObservableCell<T> {
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(CellInner {
                flags: Cell::new(CELL | CLEAN),
                value: RefCell::new(value),
                observers: ObserverList::new(),
                dependents: Dependents::new(),
                pending_prev: RefCell::new(None),
            }),
        }
    }

    /// Get the current value (cloning).
    ///
    /// Inside a computed's evaluation this registers the cell as a
    /// dependency.
    pub fn get(&self) -> T {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.value.borrow().clone()
    }

    /// Access the current value with a closure (avoids cloning).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify every observer with
    /// `(previous, current)`.
    ///
    /// While the cell is enlisted in an open batch, the state changes
    /// immediately but observer dispatch is deferred to the batch flush,
    /// which fires once with the previous value captured by the first `set`
    /// of the scope.
    pub fn set(&self, value: T) {
        assert_not_in_compute();

        let previous = self.inner.value.replace(value);

        if self.inner.is_suppressed() {
            let mut pending = self.inner.pending_prev.borrow_mut();
            if pending.is_none() {
                *pending = Some(previous);
            }
        } else {
            let current = self.inner.value.borrow().clone();
            self.inner
                .observers
                .notify_forward(&mut |cb| cb(&previous, &current));
        }

        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Append a change observer. Returns its handle.
    pub fn observe(&self, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        self.inner
            .observers
            .subscribe(Rc::new(cb) as Rc<CellCallback<T>>, None)
    }

    /// Append a change observer registered under an owner token.
    pub fn observe_owned(&self, owner: OwnerId, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        self.inner
            .observers
            .subscribe(Rc::new(cb) as Rc<CellCallback<T>>, Some(owner))
    }

    /// Invoke the callback immediately with `(current, current)`, then
    /// append it as an observer. Lets a late joiner prime itself.
    pub fn observe_and_invoke(&self, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        // Clone out before invoking: the callback may re-enter this cell.
        let current = self.inner.value.borrow().clone();
        cb(&current, &current);
        self.observe(cb)
    }

    /// Remove the observer with the given handle.
    pub fn stop_observing(&self, key: ObserverKey) -> bool {
        self.inner.observers.unsubscribe(key)
    }

    /// Remove all observers, or only those registered under `owner`.
    pub fn stop_observing_all(&self, owner: Option<OwnerId>) {
        match owner {
            Some(owner) => {
                self.inner.observers.remove_owner(owner);
            }
            None => self.inner.observers.clear(),
        }
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    // =========================================================================
    // GRAPH / BATCH ACCESS
    // =========================================================================

    /// This cell as a type-erased dependency subject.
    pub fn as_subject(&self) -> Rc<dyn AnySubject> {
        self.inner.clone()
    }

    /// This cell as a type-erased batch member.
    pub fn as_batch_member(&self) -> Rc<dyn BatchMember> {
        self.inner.clone()
    }

    /// Replace the value without notifying observers. Dependents are still
    /// marked so computed values stay coherent. Used by resolver rebinds.
    pub(crate) fn set_silent(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &*self.inner.value.borrow())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

/// Create a new observable cell.
///
/// # Example
///
/// ```
/// use loadout_observables::cell;
///
/// let gold = cell(250u32);
/// gold.set(300);
/// assert_eq!(gold.get(), 300);
/// ```
pub fn cell<T: Clone + 'static>(value: T) -> ObservableCell<T> {
    ObservableCell::new(value)
}

// =============================================================================
// TESTS
// =============================================================================
