// ============================================================================
// loadout-observables - Computed Values
// Lazily derived values with automatic dependency tracking
// ============================================================================
//
// A Computed is BOTH a subject (it can be read and depended on) AND a
// reaction (it depends on the observables its function reads). The dual
// nature is what makes chaining work: a computed built over another computed
// is just a reaction whose dependency happens to also be a reaction.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::observers::{ObserverKey, ObserverList, OwnerId};
use crate::core::types::{
    AnyReaction, AnySubject, BatchMember, CellCallback, Dependents,
};
use crate::reactivity::tracking::{install_dependencies, remove_all_deps, track_read};

// =============================================================================
// COMPUTED INNER
// =============================================================================

/// The shared state behind `Computed<T>`.
///
/// Implements AnySubject (can be read, has dependents) and AnyReaction
/// (has dependencies, goes stale, recomputes).
pub struct ComputedInner<T> {
    /// Flags bitmask (COMPUTED | status). Starts DIRTY: never computed.
    flags: Cell<u32>,

    /// The user-supplied compute function (dropped on dispose)
    compute: RefCell<Option<Box<dyn Fn() -> T>>>,

    /// Cached value (None = never computed)
    value: RefCell<Option<T>>,

    /// Downstream (previous, current) observers
    observers: ObserverList<CellCallback<T>>,

    /// Reactions depending on this computed (subject side)
    dependents: Dependents,

    /// Subjects read by the last evaluation (reaction side)
    deps: RefCell<Vec<Rc<dyn AnySubject>>>,

    /// Cached value at the first invalidation inside a batch
    pending_prev: RefCell<Option<T>>,

    /// Whether an invalidation happened while suppressed
    pending_stale: Cell<bool>,

    /// Self-reference for the subject/reaction trait hops
    self_ref: RefCell<Option<Weak<ComputedInner<T>>>>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn new(compute: impl Fn() -> T + 'static) -> Rc<Self> {
        let inner = Rc::new(Self {
            flags: Cell::new(COMPUTED | DIRTY),
            compute: RefCell::new(Some(Box::new(compute))),
            value: RefCell::new(None),
            observers: ObserverList::new(),
            dependents: Dependents::new(),
            deps: RefCell::new(Vec::new()),
            pending_prev: RefCell::new(None),
            pending_stale: Cell::new(false),
            self_ref: RefCell::new(None),
        });

        *inner.self_ref.borrow_mut() = Some(Rc::downgrade(&inner));
        inner
    }

    fn self_reaction(&self) -> Rc<dyn AnyReaction> {
        self.self_ref
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(|rc| rc as Rc<dyn AnyReaction>)
            .expect("computed self reference not initialized")
    }

    fn self_subject(&self) -> Rc<dyn AnySubject> {
        self.self_ref
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(|rc| rc as Rc<dyn AnySubject>)
            .expect("computed self reference not initialized")
    }

    /// Recompute if stale. No-op when clean, destroyed, or already computed
    /// and not invalidated since.
    fn ensure_fresh(&self) {
        if self.flags.get() & DESTROYED != 0 {
            return;
        }
        if self.flags.get() & DIRTY == 0 && self.value.borrow().is_some() {
            return;
        }
        self.recompute();
    }

    /// Run the compute function inside a tracking scope and install the
    /// dependencies it read.
    fn recompute(&self) {
        if self.flags.get() & COMPUTING != 0 {
            panic!(
                "cyclic computed dependency: a compute function read its own \
                 value, directly or through a chain of computed values"
            );
        }

        let reaction = self.self_reaction();

        // Save the tracking state; restoring it afterwards is what makes
        // nested evaluations (computed reading computed) behave as a stack.
        let prev_reaction =
            with_context(|ctx| ctx.set_active_reaction(Some(Rc::downgrade(&reaction))));
        let prev_new_deps = with_context(|ctx| ctx.swap_new_deps(Vec::new()));

        self.flags.set(self.flags.get() | COMPUTING);

        let new_value = {
            let compute = self.compute.borrow();
            let f = compute.as_ref().expect("computed evaluated after dispose");
            f()
        };

        self.flags.set(self.flags.get() & !COMPUTING);

        // Swap stale subscriptions for the ones this run actually read.
        install_dependencies(reaction);

        with_context(|ctx| {
            ctx.set_active_reaction(prev_reaction);
            ctx.swap_new_deps(prev_new_deps);
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(deps = self.deps.borrow().len(), "computed refreshed");

        *self.value.borrow_mut() = Some(new_value);
        AnyReaction::mark_clean(self);
    }

    /// Recompute now and notify observers with (previous cached, new).
    fn refresh_now(&self) {
        if self.flags.get() & DESTROYED != 0 {
            return;
        }

        let previous = self.value.borrow().clone();
        self.recompute();
        let current = self
            .value
            .borrow()
            .clone()
            .expect("value present after recompute");

        // A computed that was never read before its first invalidation has
        // no previous; prime observers with the current value on both sides.
        let previous = previous.unwrap_or_else(|| current.clone());
        self.observers
            .notify_forward(&mut |cb| cb(&previous, &current));
    }
}

// =============================================================================
// AnySubject implementation
// =============================================================================

impl<T: Clone + 'static> AnySubject for ComputedInner<T> {
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

// =============================================================================
// AnyReaction implementation
// =============================================================================

impl<T: Clone + 'static> AnyReaction for ComputedInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn add_dep(&self, subject: Rc<dyn AnySubject>) {
        self.deps.borrow_mut().push(subject);
    }

    fn clear_deps(&self) {
        self.deps.borrow_mut().clear();
    }

    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<dyn AnySubject>) -> bool) {
        for dep in self.deps.borrow().iter() {
            if !f(dep) {
                break;
            }
        }
    }

    fn remove_subject(&self, subject: &Rc<dyn AnySubject>) {
        let target = Rc::as_ptr(subject) as *const ();
        self.deps
            .borrow_mut()
            .retain(|dep| Rc::as_ptr(dep) as *const () != target);
    }

    fn note_stale(&self) -> bool {
        if self.flags.get() & DESTROYED != 0 {
            return false;
        }
        if self.flags.get() & DIRTY != 0 {
            return false;
        }

        AnyReaction::mark_dirty(self);

        if self.flags.get() & SUPPRESSED != 0 {
            self.pending_stale.set(true);
            let mut pending = self.pending_prev.borrow_mut();
            if pending.is_none() {
                *pending = self.value.borrow().clone();
            }
        }

        true
    }

    fn wants_refresh(&self) -> bool {
        self.flags.get() & (SUPPRESSED | DESTROYED) == 0 && !self.observers.is_empty()
    }

    fn refresh(&self) {
        self.refresh_now();
    }

    fn as_computed_subject(&self) -> Option<Rc<dyn AnySubject>> {
        Some(self.self_subject())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// BatchMember implementation
// =============================================================================

impl<T: Clone + 'static> BatchMember for ComputedInner<T> {
    fn begin_suppression(&self) -> bool {
        if self.flags.get() & SUPPRESSED != 0 {
            return false;
        }
        self.flags.set(self.flags.get() | SUPPRESSED);
        *self.pending_prev.borrow_mut() = None;
        self.pending_stale.set(false);
        true
    }

    fn flush(&self) {
        self.flags.set(self.flags.get() & !SUPPRESSED);

        if !self.pending_stale.get() {
            return;
        }
        self.pending_stale.set(false);

        // Recompute exactly once at flush (a lazy read during the scope may
        // already have refreshed the cache, in which case this is a no-op).
        self.ensure_fresh();

        let current = self
            .value
            .borrow()
            .clone()
            .expect("value present after flush recompute");
        let previous = self
            .pending_prev
            .borrow_mut()
            .take()
            .unwrap_or_else(|| current.clone());

        self.observers
            .notify_forward(&mut |cb| cb(&previous, &current));
    }
}

// =============================================================================
// COMPUTED<T> WRAPPER
// =============================================================================

/// A read-only observable whose value derives from other observables.
///
/// The compute function's reads are recorded automatically: whatever cells,
/// sequences, maps or other computed values it touches become dependencies,
/// re-resolved on every evaluation. The value is computed lazily on first
/// read and cached until an upstream change invalidates it.
///
/// # Example
///
/// ```
/// use loadout_observables::{cell, computed, cloned};
///
/// let base = cell(100);
/// let bonus = cell(25);
///
/// let attack = computed(cloned!(base, bonus => move || base.get() + bonus.get()));
/// assert_eq!(attack.get(), 125);
///
/// base.set(120);
/// assert_eq!(attack.get(), 145);
/// ```
#[derive(Clone)]
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value over the given function.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: ComputedInner::new(compute),
        }
    }

    /// Get the value, recomputing first when stale.
    ///
    /// Inside another computed's evaluation this registers this computed as
    /// a dependency (chaining).
    pub fn get(&self) -> T {
        self.inner.ensure_fresh();
        track_read(self.inner.clone() as Rc<dyn AnySubject>);
        self.inner
            .value
            .borrow()
            .clone()
            .expect("computed disposed before first evaluation")
    }

    /// Whether the cached value is stale (diagnostics)
    pub fn is_stale(&self) -> bool {
        AnyReaction::is_dirty(&*self.inner)
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Append a change observer. Returns its handle.
    ///
    /// Observers receive `(previous cached, new)` whenever an upstream
    /// change triggers a recompute.
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

    /// Invoke the callback immediately with `(current, current)` (computing
    /// first if needed), then append it as an observer.
    pub fn observe_and_invoke(&self, cb: impl Fn(&T, &T) + 'static) -> ObserverKey {
        let current = self.get();
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
    // CHAINING
    // =========================================================================

    /// Build a computed over this one's value.
    pub fn derive<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Computed<U> {
        let source = self.clone();
        Computed::new(move || f(&source.get()))
    }

    // =========================================================================
    // DISPOSAL
    // =========================================================================

    /// Unsubscribe from every upstream dependency and drop the compute
    /// function and observers. Further invalidations are ignored.
    pub fn dispose(&self) {
        let reaction = self.inner.self_reaction();
        remove_all_deps(&reaction);

        self.inner
            .flags
            .set(self.inner.flags.get() | DESTROYED);
        *self.inner.compute.borrow_mut() = None;
        self.inner.observers.clear();
    }

    // =========================================================================
    // GRAPH / BATCH ACCESS
    // =========================================================================

    /// This computed as a type-erased dependency subject.
    pub fn as_subject(&self) -> Rc<dyn AnySubject> {
        self.inner.clone()
    }

    /// This computed as a type-erased batch member.
    pub fn as_batch_member(&self) -> Rc<dyn BatchMember> {
        self.inner.clone()
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &*self.inner.value.borrow())
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Create a computed value.
pub fn computed<T: Clone + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloned;
    use crate::containers::cell::cell;

    #[test]
    fn computed_basic_creation() {
        let c = computed(|| 42);
        assert_eq!(c.get(), 42);
    }

    #[test]
    fn computed_tracks_cell_dependency() {
        let base = cell(100);
        let bonus = cell(25);

        let total = computed(cloned!(base, bonus => move || base.get() + bonus.get()));
        assert_eq!(total.get(), 125);

        base.set(120);
        assert_eq!(total.get(), 145);
    }

    #[test]
    fn compute_runs_exactly_once_per_upstream_change() {
        let runs = Rc::new(Cell::new(0u32));
        let base = cell(100);

        let total = computed({
            let runs = runs.clone();
            let base = base.clone();
            move || {
                runs.set(runs.get() + 1);
                base.get() + 25
            }
        });

        assert_eq!(total.get(), 125);
        assert_eq!(runs.get(), 1);

        // Cached: no recompute on repeated reads.
        assert_eq!(total.get(), 125);
        assert_eq!(runs.get(), 1);

        base.set(120);
        assert_eq!(total.get(), 145);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn observer_notified_with_previous_and_new() {
        let base = cell(10);
        let doubled = computed(cloned!(base => move || base.get() * 2));
        assert_eq!(doubled.get(), 20);

        let log: Rc<RefCell<Vec<(i32, i32)>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            doubled.observe(move |prev, cur| log.borrow_mut().push((*prev, *cur)));
        }

        base.set(15);

        assert_eq!(*log.borrow(), vec![(20, 30)]);
        assert_eq!(doubled.get(), 30);
    }

    #[test]
    fn chained_computed_propagates() {
        let base = cell(1);
        let doubled = computed(cloned!(base => move || base.get() * 2));
        let shifted = computed(cloned!(doubled => move || doubled.get() + 10));

        assert_eq!(shifted.get(), 12);

        base.set(5);
        assert_eq!(shifted.get(), 20);
    }

    #[test]
    fn derive_helper_chains() {
        let base = cell(3);
        let squared = computed(cloned!(base => move || base.get() * base.get()));
        let described = squared.derive(|n| format!("area {}", n));

        assert_eq!(described.get(), "area 9");

        base.set(4);
        assert_eq!(described.get(), "area 16");
    }

    #[test]
    fn diamond_notifies_once_per_mutation() {
        let a = cell(1);
        let b = computed(cloned!(a => move || a.get() + 10));
        let c = computed(cloned!(a => move || a.get() * 10));
        let d = computed(cloned!(b, c => move || b.get() + c.get()));

        assert_eq!(d.get(), 21);

        let notifications = Rc::new(Cell::new(0u32));
        {
            let notifications = notifications.clone();
            d.observe(move |_, _| notifications.set(notifications.get() + 1));
        }

        a.set(2);

        assert_eq!(notifications.get(), 1);
        assert_eq!(d.get(), 32);
    }

    #[test]
    fn dispose_stops_propagation() {
        let base = cell(1);
        let doubled = computed(cloned!(base => move || base.get() * 2));
        assert_eq!(doubled.get(), 2);

        let fired = Rc::new(Cell::new(0u32));
        {
            let fired = fired.clone();
            doubled.observe(move |_, _| fired.set(fired.get() + 1));
        }

        doubled.dispose();
        base.set(10);

        assert_eq!(fired.get(), 0);
        assert_eq!(base.as_subject().dependent_count(), 0);
    }

    #[test]
    fn stale_subscriptions_are_dropped_on_reevaluation() {
        let toggle = cell(true);
        let left = cell(1);
        let right = cell(100);

        let picked = computed(
            cloned!(toggle, left, right => move || {
                if toggle.get() { left.get() } else { right.get() }
            }),
        );

        assert_eq!(picked.get(), 1);
        assert_eq!(right.as_subject().dependent_count(), 0);

        toggle.set(false);
        assert_eq!(picked.get(), 100);

        // After switching branches, `left` no longer holds a subscription.
        assert_eq!(left.as_subject().dependent_count(), 0);
        assert_eq!(right.as_subject().dependent_count(), 1);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        use crate::reactivity::tracking::untrack;

        let tracked = cell(1);
        let ignored = cell(2);

        let total = computed(cloned!(tracked, ignored => move || {
            tracked.get() + untrack(|| ignored.get())
        }));

        assert_eq!(total.get(), 3);

        ignored.set(50);
        // Cached: the untracked cell is not a dependency.
        assert_eq!(total.get(), 3);

        tracked.set(10);
        assert_eq!(total.get(), 60);
    }

    #[test]
    fn observer_before_first_read_primes_on_refresh() {
        let base = cell(1);
        let doubled = computed(cloned!(base => move || base.get() * 2));

        let log: Rc<RefCell<Vec<(i32, i32)>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            doubled.observe(move |prev, cur| log.borrow_mut().push((*prev, *cur)));
        }

        // Never read yet: first upstream change computes and primes.
        base.set(5);
        assert_eq!(*log.borrow(), vec![(10, 10)]);
    }

    #[test]
    #[should_panic(expected = "cyclic computed dependency")]
    fn self_referential_computed_panics() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

        let cyclic = computed({
            let slot = slot.clone();
            move || match slot.borrow().as_ref() {
                Some(me) => me.get() + 1,
                None => 0,
            }
        });

        // Prime the cycle, then force a re-read through itself.
        *slot.borrow_mut() = Some(cyclic.clone());
        cyclic.get();
    }

    #[test]
    #[should_panic(expected = "cannot mutate observables")]
    fn writing_a_cell_inside_a_compute_panics() {
        let victim = cell(0);
        let bad = computed(cloned!(victim => move || {
            victim.set(1);
            0
        }));
        bad.get();
    }
}
