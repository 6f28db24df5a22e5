// ============================================================================
// loadout-observables - Cell Resolver
// Mirrors an externally-owned value of a different type through a cell
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use crate::containers::cell::ObservableCell;
use crate::core::observers::{ObserverKey, OwnerId};

/// An [`ObservableCell`] kept in sync with an externally-owned origin value
/// of a different type, through a pair of conversion functions.
///
/// Writes go origin-first: a panic inside the outbound conversion leaves the
/// local mirror untouched. There is no rollback in the other direction - a
/// failing inbound conversion can leave the origin mutated while the mirror
/// is not.
///
/// The local cell is created once and never replaced, which is what lets
/// [`rebind`](CellResolver::rebind) swap the origin and conversions without
/// dropping a single subscriber.
pub struct CellResolver<T, O> {
    local: ObservableCell<T>,
    origin: Rc<RefCell<O>>,
    from_origin: Rc<dyn Fn(&O) -> T>,
    to_origin: Rc<dyn Fn(&T) -> O>,
}

impl<T: Clone + 'static, O: 'static> CellResolver<T, O> {
    /// Create a resolver over an origin value, seeding the mirror through
    /// the inbound conversion.
    pub fn new(
        origin: Rc<RefCell<O>>,
        from_origin: impl Fn(&O) -> T + 'static,
        to_origin: impl Fn(&T) -> O + 'static,
    ) -> Self {
        let initial = from_origin(&origin.borrow());
        Self {
            local: ObservableCell::new(initial),
            origin,
            from_origin: Rc::new(from_origin),
            to_origin: Rc::new(to_origin),
        }
    }

    /// Get the mirrored value.
    pub fn get(&self) -> T {
        self.local.get()
    }

    /// Set through the local type: writes the origin first, then the
    /// mirror (which notifies observers).
    pub fn set(&self, value: T) {
        *self.origin.borrow_mut() = (self.to_origin)(&value);
        self.local.set(value);
    }

    /// Set through the origin type: converts inbound, writes the origin,
    /// then the mirror.
    pub fn set_origin(&self, value: O) {
        let local_value = (self.from_origin)(&value);
        *self.origin.borrow_mut() = value;
        self.local.set(local_value);
    }

    /// Push the current mirror value back through the outbound conversion
    /// into the origin.
    pub fn update_origin(&self) {
        let value = self.local.get();
        *self.origin.borrow_mut() = (self.to_origin)(&value);
    }

    /// Swap the origin and both conversion functions, eagerly rebuilding
    /// the mirror from the new origin.
    ///
    /// Observer registrations are untouched: subscribers keep receiving
    /// notifications for mutations made after the rebind. The rebuild
    /// itself fires no observer events (dependent computeds are still
    /// marked stale).
    pub fn rebind(
        &mut self,
        origin: Rc<RefCell<O>>,
        from_origin: impl Fn(&O) -> T + 'static,
        to_origin: impl Fn(&T) -> O + 'static,
    ) {
        #[cfg(feature = "tracing")]
        tracing::trace!("cell resolver rebind");

        self.from_origin = Rc::new(from_origin);
        self.to_origin = Rc::new(to_origin);

        let rebuilt = (self.from_origin)(&origin.borrow());
        self.origin = origin;
        self.local.set_silent(rebuilt);
    }

    // =========================================================================
    // DELEGATED OBSERVER OPERATIONS
    // =========================================================================

    /// Append a change observer on the mirror.
    pub fn observe(&self, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        self.local.observe(cb)
    }

    /// Append an owned change observer on the mirror.
    pub fn observe_owned(&self, owner: OwnerId, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        self.local.observe_owned(owner, cb)
    }

    /// Invoke with `(current, current)`, then append.
    pub fn observe_and_invoke(&self, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        self.local.observe_and_invoke(cb)
    }

    /// Remove the observer with the given handle.
    pub fn stop_observing(&self, key: ObserverKey) -> bool {
        self.local.stop_observing(key)
    }

    /// Remove all observers, or only those registered under `owner`.
    pub fn stop_observing_all(&self, owner: Option<OwnerId>) {
        self.local.stop_observing_all(owner)
    }

    /// The mirror cell itself (for computed reads or batch enlistment).
    pub fn local(&self) -> &ObservableCell<T> {
        &self.local
    }

    /// The current origin handle.
    pub fn origin_handle(&self) -> Rc<RefCell<O>> {
        self.origin.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Origin stores centi-units; the mirror exposes whole units.
    fn centi_resolver(origin: Rc<RefCell<i64>>) -> CellResolver<f64, i64> {
        CellResolver::new(
            origin,
            |centi| *centi as f64 / 100.0,
            |units| (*units * 100.0).round() as i64,
        )
    }

    #[test]
    fn mirror_seeds_from_origin() {
        let origin = Rc::new(RefCell::new(250_i64));
        let price = centi_resolver(origin);
        assert_eq!(price.get(), 2.5);
    }

    #[test]
    fn set_writes_origin_first_then_notifies() {
        let origin = Rc::new(RefCell::new(0_i64));
        let price = centi_resolver(origin.clone());

        let log: Rc<RefCell<Vec<(f64, f64)>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            price.observe(move |prev, cur| log.borrow_mut().push((*prev, *cur)));
        }

        price.set(4.2);

        assert_eq!(*origin.borrow(), 420);
        assert_eq!(*log.borrow(), vec![(0.0, 4.2)]);
    }

    #[test]
    fn set_origin_converts_inbound() {
        let origin = Rc::new(RefCell::new(100_i64));
        let price = centi_resolver(origin.clone());

        price.set_origin(999);

        assert_eq!(*origin.borrow(), 999);
        assert_eq!(price.get(), 9.99);
    }

    #[test]
    fn update_origin_pushes_mirror_value() {
        let origin = Rc::new(RefCell::new(100_i64));
        let price = centi_resolver(origin.clone());

        // Someone clobbers the origin behind our back, then we re-assert it.
        *origin.borrow_mut() = 0;
        price.update_origin();

        assert_eq!(*origin.borrow(), 100);
    }

    #[test]
    fn rebind_keeps_subscribers() {
        let old_origin = Rc::new(RefCell::new(100_i64));
        let mut price = centi_resolver(old_origin.clone());

        let count = Rc::new(Cell::new(0u32));
        {
            let count = count.clone();
            price.observe(move |_, _| count.set(count.get() + 1));
        }

        let new_origin = Rc::new(RefCell::new(5000_i64));
        price.rebind(
            new_origin.clone(),
            |centi| *centi as f64 / 100.0,
            |units| (*units * 100.0).round() as i64,
        );

        // Rebuild was silent, mirror follows the new origin.
        assert_eq!(count.get(), 0);
        assert_eq!(price.get(), 50.0);

        // The surviving subscriber still hears new mutations.
        price.set(1.0);
        assert_eq!(count.get(), 1);
        assert_eq!(*new_origin.borrow(), 100);
        // The old origin is no longer written.
        assert_eq!(*old_origin.borrow(), 100);
    }

    #[test]
    fn failing_outbound_conversion_leaves_mirror_unchanged() {
        let origin = Rc::new(RefCell::new(0_i64));
        let strict: CellResolver<f64, i64> = CellResolver::new(
            origin,
            |centi| *centi as f64,
            |units| {
                if units.is_nan() {
                    panic!("NaN has no origin representation");
                }
                *units as i64
            },
        );

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            strict.set(f64::NAN);
        }));
        assert!(result.is_err());

        // Origin-first ordering: the mirror never saw the bad write.
        assert_eq!(strict.get(), 0.0);
    }
}
