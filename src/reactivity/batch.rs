// ============================================================================
// loadout-observables - Batch
// A scoped transaction coalescing notifications per enlisted entity
// ============================================================================
//
// Enlisting an entity suppresses its observer dispatch for the scope.
// Mutations still apply immediately; each enlisted entity records one
// pending change whose previous side comes from the first mutation of the
// scope and whose current side is overwritten by every later one. The flush
// runs on Drop, so it happens on every exit path, early returns and panics
// included.
// ============================================================================

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use crate::containers::cell::ObservableCell;
use crate::containers::map::ObservableMap;
use crate::containers::sequence::ObservableSequence;
use crate::core::types::BatchMember;
use crate::reactivity::computed::Computed;

// =============================================================================
// ENLISTABLE
// =============================================================================

/// Anything a batch can enlist: cells, sequences, maps and computed values.
pub trait Enlistable {
    /// The type-erased batch membership handle.
    fn batch_member(&self) -> Rc<dyn BatchMember>;
}

impl<T: Clone + 'static> Enlistable for ObservableCell<T> {
    fn batch_member(&self) -> Rc<dyn BatchMember> {
        self.as_batch_member()
    }
}

impl<T: Clone + 'static> Enlistable for ObservableSequence<T> {
    fn batch_member(&self) -> Rc<dyn BatchMember> {
        self.as_batch_member()
    }
}

impl<K, V> Enlistable for ObservableMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn batch_member(&self) -> Rc<dyn BatchMember> {
        self.as_batch_member()
    }
}

impl<T: Clone + 'static> Enlistable for Computed<T> {
    fn batch_member(&self) -> Rc<dyn BatchMember> {
        self.as_batch_member()
    }
}

// =============================================================================
// BATCH
// =============================================================================

/// A scoped notification transaction.
///
/// Each enlisted entity flushes exactly one coalesced notification when the
/// scope ends, regardless of how many mutations it saw inside the scope.
/// Entities flush in enlistment order. Computed members recompute exactly
/// once at flush.
///
/// # Example
///
/// ```
/// use loadout_observables::{cell, Batch};
///
/// let hp = cell(100);
/// hp.observe(|prev, cur| println!("hp {} -> {}", prev, cur));
///
/// {
///     let batch = Batch::begin();
///     batch.add(&hp);
///     hp.set(90);
///     hp.set(80);
///     hp.set(70);
/// } // one notification: (100, 70)
/// ```
pub struct Batch {
    members: RefCell<Vec<Rc<dyn BatchMember>>>,
}

impl Batch {
    /// Open a new batch scope with an empty enlistment set.
    pub fn begin() -> Self {
        Self {
            members: RefCell::new(Vec::new()),
        }
    }

    /// Enlist an entity, suppressing its notifications until the scope
    /// ends. Enlisting the same entity twice is a no-op.
    pub fn add(&self, entity: &dyn Enlistable) {
        let member = entity.batch_member();
        if member.begin_suppression() {
            self.members.borrow_mut().push(member);
        }
    }

    /// Number of enlisted entities
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    /// True when nothing is enlisted
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// End the scope now, flushing every enlisted entity.
    ///
    /// Dropping the batch does the same; this just makes the point explicit
    /// at the call site.
    pub fn flush(self) {
        drop(self);
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        let members = std::mem::take(&mut *self.members.borrow_mut());

        #[cfg(feature = "tracing")]
        tracing::trace!(members = members.len(), "batch flush");

        // Enlistment order, exactly once each.
        for member in members {
            member.flush();
        }
    }
}

/// Run a closure inside a batch scope.
///
/// # Example
///
/// ```
/// use loadout_observables::{batch, cell};
///
/// let a = cell(1);
/// let b = cell(2);
///
/// batch(|scope| {
///     scope.add(&a);
///     scope.add(&b);
///     a.set(10);
///     b.set(20);
/// }); // both flush here
/// ```
pub fn batch<R>(f: impl FnOnce(&Batch) -> R) -> R {
    let scope = Batch::begin();
    f(&scope)
    // scope drops here, flushing every enlisted entity
}

// =============================================================================
// TESTS
// =============================================================================
