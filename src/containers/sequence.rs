// ============================================================================
// loadout-observables - Observable Sequence
// An ordered, index-addressed collection with change observers
// ============================================================================
//
// Removal notifications are the delicate part: a callback invoked during a
// removal may itself unsubscribe. Removal and clear therefore walk the
// observer list in reverse over a pre-taken snapshot, re-validating each
// entry against the live list before invoking it, so no callback is skipped
// or double-invoked by self-unsubscription.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::observers::{ObserverKey, ObserverList, OwnerId};
use crate::core::types::{
    AnyReaction, AnySubject, BatchMember, Dependents, SequenceCallback, UpdateType,
};
use crate::reactivity::tracking::{assert_not_in_compute, mark_dependents, track_read};

// =============================================================================
// PENDING CHANGE (batch coalescing)
// =============================================================================

/// One coalesced event recorded while enlisted in a batch.
///
/// The first mutation of the scope fixes `previous`; every later mutation
/// overwrites only the current side (index, kind, current).
struct PendingChange<T> {
    index: usize,
    kind: UpdateType,
    previous: Option<T>,
    current: Option<T>,
}

// =============================================================================
// SEQUENCE INNER
// =============================================================================

/// The shared state behind `ObservableSequence<T>`.
pub struct SequenceInner<T> {
    flags: Cell<u32>,

    /// Backing storage
    items: RefCell<Vec<T>>,

    /// (index, previous, current, kind) callbacks
    observers: ObserverList<SequenceCallback<T>>,

    /// Computed values reading this sequence
    dependents: Dependents,

    /// Coalesced event while enlisted in a batch
    pending: RefCell<Option<PendingChange<T>>>,
}

impl<T: Clone + 'static> SequenceInner<T> {
    /// Route one event: defer while suppressed, otherwise dispatch now.
    fn emit(&self, index: usize, previous: Option<T>, current: Option<T>, kind: UpdateType) {
        if self.flags.get() & SUPPRESSED != 0 {
            let mut pending = self.pending.borrow_mut();
            match pending.as_mut() {
                Some(change) => {
                    change.index = index;
                    change.kind = kind;
                    change.current = current;
                }
                None => {
                    *pending = Some(PendingChange {
                        index,
                        kind,
                        previous,
                        current,
                    });
                }
            }
        } else {
            self.dispatch(index, previous.as_ref(), current.as_ref(), kind);
        }
    }

    /// Invoke observers for one event. `Removed` walks in reverse.
    fn dispatch(&self, index: usize, previous: Option<&T>, current: Option<&T>, kind: UpdateType) {
        match kind {
            UpdateType::Removed => self
                .observers
                .notify_reverse(&mut |cb| cb(index, previous, current, kind)),
            _ => self
                .observers
                .notify_forward(&mut |cb| cb(index, previous, current, kind)),
        }
    }
}

impl<T: 'static> AnySubject for SequenceInner<T> {
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

impl<T: Clone + 'static> BatchMember for SequenceInner<T> {
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
                change.index,
                change.previous.as_ref(),
                change.current.as_ref(),
                change.kind,
            );
        }
    }
}

// =============================================================================
// OBSERVABLE SEQUENCE
// =============================================================================

/// An ordered, index-addressed observable collection.
///
/// Observers receive `(index, previous, current, UpdateType)`. The index
/// always refers to the element's position at the time of the event:
/// `clear` removes back-to-front so every emitted index is valid when its
/// callbacks run.
///
/// # Example
///
/// ```
/// use loadout_observables::{sequence, UpdateType};
///
/// let inventory = sequence(vec!["Sword".to_string(), "Potion".to_string()]);
/// inventory.observe(|index, _prev, cur, kind| {
///     if kind == UpdateType::Added {
///         println!("slot {}: {:?}", index, cur);
///     }
/// });
///
/// inventory.add("Shield".to_string()); // Added at index 2
/// ```
#[derive(Clone)]
pub struct ObservableSequence<T> {
    inner: Rc<SequenceInner<T>>,
}

impl<T: Clone + 'static> ObservableSequence<T> {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create a sequence over existing items.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(SequenceInner {
                flags: Cell::new(SEQUENCE | CLEAN),
                items: RefCell::new(items),
                observers: ObserverList::new(),
                dependents: Dependents::new(),
                pending: RefCell::new(None),
            }),
        }
    }

    // =========================================================================
    // READS (all tracked)
    // =========================================================================

    /// Number of elements
    pub fn len(&self) -> usize {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.items.borrow().len()
    }

    /// True when the sequence holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the element at `index` (cloning), or None when out of range.
    pub fn get(&self, index: usize) -> Option<T> {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner.items.borrow().get(index).cloned()
    }

    /// Access the backing slice with a closure (avoids cloning).
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        f(&self.inner.items.borrow())
    }

    /// Snapshot the elements into a plain Vec.
    pub fn to_vec(&self) -> Vec<T> {
        self.with(|items| items.to_vec())
    }

    /// Whether any element equals `value`
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.with(|items| items.contains(value))
    }

    /// Index of the first element equal to `value`
    pub fn index_of(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.with(|items| items.iter().position(|item| item == value))
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Replace the element at `index`, emitting `Updated` with
    /// `(previous, current)`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range, matching `Vec` indexing.
    pub fn set(&self, index: usize, value: T) {
        assert_not_in_compute();

        let previous = {
            let mut items = self.inner.items.borrow_mut();
            std::mem::replace(&mut items[index], value.clone())
        };

        self.inner
            .emit(index, Some(previous), Some(value), UpdateType::Updated);
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }

    /// Append an element, emitting `Added` at the new last index.
    pub fn add(&self, value: T) {
        assert_not_in_compute();

        let index = {
            let mut items = self.inner.items.borrow_mut();
            items.push(value.clone());
            items.len() - 1
        };

        self.inner.emit(index, None, Some(value), UpdateType::Added);
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }

    /// Remove the first element equal to `value`. Returns whether one was
    /// found.
    pub fn remove(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        let index = {
            let items = self.inner.items.borrow();
            items.iter().position(|item| item == value)
        };

        match index {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    /// Remove the element at `index`, emitting `Removed` with the removed
    /// value as previous and no current. Returns the removed element.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range, matching `Vec::remove`.
    pub fn remove_at(&self, index: usize) -> T {
        assert_not_in_compute();

        let removed = self.inner.items.borrow_mut().remove(index);

        self.inner
            .emit(index, Some(removed.clone()), None, UpdateType::Removed);
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
        removed
    }

    /// Remove every element, emitting `Removed` once per element.
    ///
    /// Elements go back-to-front so each emitted index is the element's
    /// position at the time of its event. The observer list is snapshotted
    /// once up front; entries are still re-validated before every call, so a
    /// callback that unsubscribes mid-clear cannot corrupt the iteration.
    pub fn clear(&self) {
        assert_not_in_compute();

        if self.inner.flags.get() & SUPPRESSED != 0 {
            loop {
                let popped = self.inner.items.borrow_mut().pop();
                let Some(removed) = popped else { break };
                let index = self.inner.items.borrow().len();
                self.inner
                    .emit(index, Some(removed), None, UpdateType::Removed);
            }
        } else {
            let snapshot = self.inner.observers.snapshot();
            loop {
                let popped = self.inner.items.borrow_mut().pop();
                let Some(removed) = popped else { break };
                let index = self.inner.items.borrow().len();

                for (key, cb) in snapshot.iter().rev() {
                    if !self.inner.observers.contains(*key) {
                        continue;
                    }
                    cb(index, Some(&removed), None, UpdateType::Removed);
                }
            }
        }

        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Append a change observer. Returns its handle.
    pub fn observe(
        &self,
        cb: impl Fn(usize, Option<&T>, Option<&T>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.inner
            .observers
            .subscribe(Rc::new(cb) as Rc<SequenceCallback<T>>, None)
    }

    /// Append a change observer registered under an owner token.
    pub fn observe_owned(
        &self,
        owner: OwnerId,
        cb: impl Fn(usize, Option<&T>, Option<&T>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.inner
            .observers
            .subscribe(Rc::new(cb) as Rc<SequenceCallback<T>>, Some(owner))
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

    /// This sequence as a type-erased dependency subject.
    pub fn as_subject(&self) -> Rc<dyn AnySubject> {
        self.inner.clone()
    }

    /// This sequence as a type-erased batch member.
    pub fn as_batch_member(&self) -> Rc<dyn BatchMember> {
        self.inner.clone()
    }

    /// Replace the backing storage without notifying observers. Dependents
    /// are still marked. Used by resolver rebinds.
    pub(crate) fn replace_items_silent(&self, items: Vec<T>) {
        *self.inner.items.borrow_mut() = items;
        mark_dependents(self.inner.clone() as Rc<dyn AnySubject>);
    }
}

impl<T: Clone + 'static> Default for ObservableSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for ObservableSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableSequence")
            .field("items", &*self.inner.items.borrow())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

/// Create an observable sequence over existing items.
pub fn sequence<T: Clone + 'static>(items: Vec<T>) -> ObservableSequence<T> {
    ObservableSequence::from_vec(items)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    type Event = (usize, Option<String>, Option<String>, UpdateType);

    fn recording(seq: &ObservableSequence<String>) -> Rc<RefCell<Vec<Event>>> {
        let log: Rc<RefCell<Vec<Event>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            seq.observe(move |index, prev, cur, kind| {
                log.borrow_mut()
                    .push((index, prev.cloned(), cur.cloned(), kind));
            });
        }
        log
    }

    fn s(text: &str) -> String {
        text.to_string()
    }

    #[test]
    fn add_emits_added_at_last_index() {
        let seq = sequence(vec![s("Sword"), s("Potion")]);
        let log = recording(&seq);

        seq.add(s("Shield"));

        assert_eq!(
            *log.borrow(),
            vec![(2, None, Some(s("Shield")), UpdateType::Added)]
        );
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn remove_at_emits_removed_with_previous() {
        let seq = sequence(vec![s("Sword"), s("Potion")]);
        let log = recording(&seq);

        let removed = seq.remove_at(0);

        assert_eq!(removed, s("Sword"));
        assert_eq!(
            *log.borrow(),
            vec![(0, Some(s("Sword")), None, UpdateType::Removed)]
        );
        assert_eq!(seq.to_vec(), vec![s("Potion")]);
    }

    #[test]
    fn set_emits_updated_with_both_values() {
        let seq = sequence(vec![s("Sword")]);
        let log = recording(&seq);

        seq.set(0, s("Axe"));

        assert_eq!(
            *log.borrow(),
            vec![(0, Some(s("Sword")), Some(s("Axe")), UpdateType::Updated)]
        );
    }

    #[test]
    fn remove_by_value_finds_first_match() {
        let seq = sequence(vec![s("a"), s("b"), s("a")]);
        let log = recording(&seq);

        assert!(seq.remove(&s("a")));
        assert!(!seq.remove(&s("zzz")));

        assert_eq!(seq.to_vec(), vec![s("b"), s("a")]);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].0, 0);
    }

    #[test]
    fn clear_emits_removed_back_to_front() {
        let seq = sequence(vec![s("a"), s("b"), s("c")]);
        let log = recording(&seq);

        seq.clear();

        let events = log.borrow();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], (2, Some(s("c")), None, UpdateType::Removed));
        assert_eq!(events[1], (1, Some(s("b")), None, UpdateType::Removed));
        assert_eq!(events[2], (0, Some(s("a")), None, UpdateType::Removed));
        assert!(seq.is_empty());
    }

    #[test]
    fn self_unsubscription_during_removal_skips_nobody_else() {
        let seq = sequence(vec![s("Sword"), s("Potion"), s("Shield")]);

        let fired: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let own_key: Rc<Cell<Option<ObserverKey>>> = Rc::new(Cell::new(None));

        // First subscriber (fires last in reverse dispatch).
        {
            let fired = fired.clone();
            seq.observe(move |_, _, _, _| fired.borrow_mut().push(1));
        }

        // Second subscriber unsubscribes itself mid-dispatch.
        let key = {
            let fired = fired.clone();
            let own_key = own_key.clone();
            let seq2 = seq.clone();
            seq.observe(move |_, _, _, _| {
                fired.borrow_mut().push(2);
                if let Some(key) = own_key.get() {
                    seq2.stop_observing(key);
                }
            })
        };
        own_key.set(Some(key));

        // Third subscriber (fires first in reverse dispatch).
        {
            let fired = fired.clone();
            seq.observe(move |_, _, _, _| fired.borrow_mut().push(3));
        }

        seq.remove_at(0);

        // Reverse order, nobody skipped despite the self-unsubscription.
        assert_eq!(*fired.borrow(), vec![3, 2, 1]);

        // The self-unsubscribed observer stays gone.
        fired.borrow_mut().clear();
        seq.remove_at(0);
        assert_eq!(*fired.borrow(), vec![3, 1]);
    }

    #[test]
    fn unsubscribe_mid_clear_does_not_corrupt_iteration() {
        let seq = sequence(vec![s("a"), s("b")]);

        let fired: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let own_key: Rc<Cell<Option<ObserverKey>>> = Rc::new(Cell::new(None));

        let key = {
            let fired = fired.clone();
            let own_key = own_key.clone();
            let seq2 = seq.clone();
            seq.observe(move |_, _, _, _| {
                fired.borrow_mut().push(1);
                if let Some(key) = own_key.get() {
                    seq2.stop_observing(key);
                }
            })
        };
        own_key.set(Some(key));

        {
            let fired = fired.clone();
            seq.observe(move |_, _, _, _| fired.borrow_mut().push(2));
        }

        seq.clear();

        // Self-unsubscriber fires once (first event only); the survivor sees
        // both removal events.
        assert_eq!(*fired.borrow(), vec![2, 1, 2]);
        assert!(seq.is_empty());
    }

    #[test]
    fn index_queries() {
        let seq = sequence(vec![s("a"), s("b")]);
        assert!(seq.contains(&s("a")));
        assert!(!seq.contains(&s("x")));
        assert_eq!(seq.index_of(&s("b")), Some(1));
        assert_eq!(seq.index_of(&s("x")), None);
        assert_eq!(seq.get(0), Some(s("a")));
        assert_eq!(seq.get(9), None);
    }

    #[test]
    #[should_panic]
    fn set_out_of_range_panics() {
        let seq = sequence(vec![s("a")]);
        seq.set(5, s("b"));
    }
}
