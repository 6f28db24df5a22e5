// ============================================================================
// loadout-observables - Sequence Resolver
// Mirrors an externally-owned Vec of a different element type
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use crate::containers::sequence::ObservableSequence;
use crate::core::observers::{ObserverKey, OwnerId};
use crate::core::types::UpdateType;

/// An [`ObservableSequence`] kept element-for-element in sync with an
/// externally-owned `Vec` of a different element type.
///
/// Every mutating operation applies to the origin first, then the mirror.
/// The caller must not mutate the origin directly while the resolver is
/// bound to it, or the mirror invariant breaks.
pub struct SequenceResolver<T, O> {
    local: ObservableSequence<T>,
    origin: Rc<RefCell<Vec<O>>>,
    from_origin: Rc<dyn Fn(&O) -> T>,
    to_origin: Rc<dyn Fn(&T) -> O>,
}

impl<T: Clone + 'static, O: 'static> SequenceResolver<T, O> {
    /// Create a resolver over an origin Vec, seeding the mirror through the
    /// inbound conversion.
    pub fn new(
        origin: Rc<RefCell<Vec<O>>>,
        from_origin: impl Fn(&O) -> T + 'static,
        to_origin: impl Fn(&T) -> O + 'static,
    ) -> Self {
        let seeded: Vec<T> = origin.borrow().iter().map(&from_origin).collect();
        Self {
            local: ObservableSequence::from_vec(seeded),
            origin,
            from_origin: Rc::new(from_origin),
            to_origin: Rc::new(to_origin),
        }
    }

    // =========================================================================
    // READS (delegated to the mirror)
    // =========================================================================

    /// Number of mirrored elements
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// True when the mirror holds no elements
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Get the mirrored element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.local.get(index)
    }

    /// Snapshot the mirrored elements.
    pub fn to_vec(&self) -> Vec<T> {
        self.local.to_vec()
    }

    /// Whether the mirror contains `value`
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.local.contains(value)
    }

    /// Index of the first mirrored element equal to `value`
    pub fn index_of(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.local.index_of(value)
    }

    // =========================================================================
    // MUTATIONS (origin first, then mirror)
    // =========================================================================

    /// Append through the local type.
    pub fn add(&self, value: T) {
        self.origin.borrow_mut().push((self.to_origin)(&value));
        self.local.add(value);
    }

    /// Append through the origin type.
    pub fn add_origin(&self, value: O) {
        let local_value = (self.from_origin)(&value);
        self.origin.borrow_mut().push(value);
        self.local.add(local_value);
    }

    /// Replace the element at `index` through the local type.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range for either replica.
    pub fn set(&self, index: usize, value: T) {
        self.origin.borrow_mut()[index] = (self.to_origin)(&value);
        self.local.set(index, value);
    }

    /// Replace the element at `index` through the origin type.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range for either replica.
    pub fn update_origin(&self, index: usize, value: O) {
        let local_value = (self.from_origin)(&value);
        self.origin.borrow_mut()[index] = value;
        self.local.set(index, local_value);
    }

    /// Remove the first mirrored element equal to `value`.
    pub fn remove(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        match self.local.index_of(value) {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    /// Remove the first origin element equal to `value`.
    pub fn remove_origin(&self, value: &O) -> bool
    where
        O: PartialEq,
    {
        let index = {
            let origin = self.origin.borrow();
            origin.iter().position(|item| item == value)
        };
        match index {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    /// Remove the element at `index` from both replicas.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    pub fn remove_at(&self, index: usize) -> T {
        self.origin.borrow_mut().remove(index);
        self.local.remove_at(index)
    }

    /// Remove every element from both replicas.
    pub fn clear(&self) {
        self.origin.borrow_mut().clear();
        self.local.clear();
    }

    /// Swap the origin and both conversion functions, eagerly rebuilding
    /// the mirror from the new origin. Observer registrations are
    /// untouched; the rebuild itself fires no observer events.
    pub fn rebind(
        &mut self,
        origin: Rc<RefCell<Vec<O>>>,
        from_origin: impl Fn(&O) -> T + 'static,
        to_origin: impl Fn(&T) -> O + 'static,
    ) {
        #[cfg(feature = "tracing")]
        tracing::trace!("sequence resolver rebind");

        self.from_origin = Rc::new(from_origin);
        self.to_origin = Rc::new(to_origin);

        let rebuilt: Vec<T> = origin.borrow().iter().map(|item| (self.from_origin)(item)).collect();
        self.origin = origin;
        self.local.replace_items_silent(rebuilt);
    }

    // =========================================================================
    // DELEGATED OBSERVER OPERATIONS
    // =========================================================================

    /// Append a change observer on the mirror.
    pub fn observe(
        &self,
        cb: impl Fn(usize, Option<&T>, Option<&T>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.local.observe(cb)
    }

    /// Append an owned change observer on the mirror.
    pub fn observe_owned(
        &self,
        owner: OwnerId,
        cb: impl Fn(usize, Option<&T>, Option<&T>, UpdateType) + 'static,
    ) -> ObserverKey {
        self.local.observe_owned(owner, cb)
    }

    /// Remove the observer with the given handle.
    pub fn stop_observing(&self, key: ObserverKey) -> bool {
        self.local.stop_observing(key)
    }

    /// Remove all observers, or only those registered under `owner`.
    pub fn stop_observing_all(&self, owner: Option<OwnerId>) {
        self.local.stop_observing_all(owner)
    }

    /// The mirror sequence itself (for computed reads or batch enlistment).
    pub fn local(&self) -> &ObservableSequence<T> {
        &self.local
    }

    /// The current origin handle.
    pub fn origin_handle(&self) -> Rc<RefCell<Vec<O>>> {
        self.origin.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Origin stores raw item ids; the mirror exposes display labels.
    fn labeled(origin: Rc<RefCell<Vec<u32>>>) -> SequenceResolver<String, u32> {
        SequenceResolver::new(
            origin,
            |id| format!("item#{id}"),
            |label| {
                label
                    .trim_start_matches("item#")
                    .parse()
                    .expect("label carries an id")
            },
        )
    }

    #[test]
    fn mirror_seeds_from_origin() {
        let origin = Rc::new(RefCell::new(vec![7, 9]));
        let items = labeled(origin);

        assert_eq!(items.to_vec(), vec!["item#7".to_string(), "item#9".to_string()]);
    }

    #[test]
    fn add_origin_converts_and_notifies() {
        let origin = Rc::new(RefCell::new(Vec::new()));
        let items = labeled(origin.clone());

        let log: Rc<RefCell<Vec<(usize, Option<String>, UpdateType)>>> =
            Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            items.observe(move |index, _prev, cur, kind| {
                log.borrow_mut().push((index, cur.cloned(), kind));
            });
        }

        items.add_origin(42);

        assert_eq!(*origin.borrow(), vec![42]);
        assert_eq!(items.get(0), Some("item#42".to_string()));
        assert_eq!(
            *log.borrow(),
            vec![(0, Some("item#42".to_string()), UpdateType::Added)]
        );
    }

    #[test]
    fn add_writes_both_replicas() {
        let origin = Rc::new(RefCell::new(Vec::new()));
        let items = labeled(origin.clone());

        items.add("item#3".to_string());

        assert_eq!(*origin.borrow(), vec![3]);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn remove_and_remove_origin_stay_in_sync() {
        let origin = Rc::new(RefCell::new(vec![1, 2, 3]));
        let items = labeled(origin.clone());

        assert!(items.remove(&"item#2".to_string()));
        assert_eq!(*origin.borrow(), vec![1, 3]);

        assert!(items.remove_origin(&3));
        assert_eq!(*origin.borrow(), vec![1]);
        assert_eq!(items.to_vec(), vec!["item#1".to_string()]);

        assert!(!items.remove_origin(&99));
    }

    #[test]
    fn set_and_update_origin_replace_in_place() {
        let origin = Rc::new(RefCell::new(vec![1]));
        let items = labeled(origin.clone());

        items.set(0, "item#5".to_string());
        assert_eq!(*origin.borrow(), vec![5]);

        items.update_origin(0, 8);
        assert_eq!(items.get(0), Some("item#8".to_string()));
    }

    #[test]
    fn clear_empties_both_replicas() {
        let origin = Rc::new(RefCell::new(vec![1, 2]));
        let items = labeled(origin.clone());

        items.clear();

        assert!(origin.borrow().is_empty());
        assert!(items.is_empty());
    }

    #[test]
    fn rebind_preserves_subscribers_and_rebuilds() {
        let old_origin = Rc::new(RefCell::new(vec![1]));
        let mut items = labeled(old_origin.clone());

        let events = Rc::new(std::cell::Cell::new(0u32));
        {
            let events = events.clone();
            items.observe(move |_, _, _, _| events.set(events.get() + 1));
        }

        let new_origin = Rc::new(RefCell::new(vec![10, 20]));
        items.rebind(
            new_origin.clone(),
            |id| format!("item#{id}"),
            |label| label.trim_start_matches("item#").parse().unwrap(),
        );

        // Silent rebuild, two mirrored entries.
        assert_eq!(events.get(), 0);
        assert_eq!(items.len(), 2);
        assert_eq!(items.get(0), Some("item#10".to_string()));

        // New mutations reach the surviving subscriber and the new origin.
        items.add_origin(30);
        assert_eq!(events.get(), 1);
        assert_eq!(*new_origin.borrow(), vec![10, 20, 30]);
        assert_eq!(*old_origin.borrow(), vec![1]);
    }
}
