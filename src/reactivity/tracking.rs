// ============================================================================
// loadout-observables - Dependency Tracking
// Recording reads and propagating staleness through the computed graph
// ============================================================================
//
// The key Rust constraint is borrow scoping: dependent lists live in
// RefCells, and walking them can re-enter the same container. Everything
// here uses the collect-then-mutate pattern: copy out of the RefCell,
// release the borrow, then act on the copies.
// ============================================================================

use std::rc::Rc;

use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySubject};

// =============================================================================
// TRACK READ - Register a dependency when reading an observable
// =============================================================================

/// Track a read of a subject, recording it as a dependency of the computed
/// value currently evaluating (if any).
///
/// Called by every value-reading getter on cells, sequences, maps and
/// computed values. Outside a compute function, or inside `untrack`, this is
/// a no-op.
pub fn track_read(subject: Rc<dyn AnySubject>) {
    with_context(|ctx| {
        if !ctx.has_active_reaction() || ctx.is_untracking() {
            return;
        }
        ctx.add_new_dep(subject);
    });
}

// =============================================================================
// MUTATION GUARD
// =============================================================================

/// Panic if called while a compute function is on the stack.
///
/// Compute functions must be pure reads; a write from inside one would
/// invalidate the value being computed.
pub(crate) fn assert_not_in_compute() {
    let inside = with_context(|ctx| {
        ctx.get_active_reaction()
            .and_then(|weak| weak.upgrade())
            .is_some()
    });
    if inside {
        panic!(
            "cannot mutate observables inside a computed value's evaluation; \
             compute functions must be pure reads"
        );
    }
}

// =============================================================================
// MARK DEPENDENTS - Propagate staleness, then refresh observed computeds
// =============================================================================

/// Propagate a mutation of `subject` through its dependent computed values.
///
/// Two phases:
/// 1. **Mark**: walk the dependent graph iteratively (explicit stack, no
///    recursion), flag every reachable computed as stale, and collect the
///    ones that want an eager refresh (they have observers and are not
///    enlisted in an open batch). Propagation stops descending at reactions
///    that were already stale.
/// 2. **Refresh**: recompute each collected computed that is still stale and
///    notify its observers once.
///
/// The phase split is what keeps diamond-shaped graphs at one notification
/// per mutation: every reachable node is stale before the first recompute
/// reads anything.
pub fn mark_dependents(subject: Rc<dyn AnySubject>) {
    let mut scheduled: Vec<Rc<dyn AnyReaction>> = Vec::new();
    let mut stack: Vec<Rc<dyn AnySubject>> = vec![subject];

    while let Some(current) = stack.pop() {
        // Keep dependent lists from accumulating dropped computeds.
        current.cleanup_dead_dependents();

        // Collect first, then release the borrow before touching reactions.
        let dependents: Vec<Rc<dyn AnyReaction>> = {
            let mut collected = Vec::new();
            current.for_each_dependent(&mut |reaction| {
                collected.push(reaction);
                true
            });
            collected
        };

        for reaction in dependents {
            if !reaction.note_stale() {
                continue;
            }
            if reaction.wants_refresh() {
                scheduled.push(reaction.clone());
            }
            if let Some(downstream) = reaction.as_computed_subject() {
                stack.push(downstream);
            }
        }
    }

    #[cfg(feature = "tracing")]
    if !scheduled.is_empty() {
        tracing::trace!(count = scheduled.len(), "refreshing observed computeds");
    }

    for reaction in scheduled {
        // A refresh earlier in the pass may already have pulled this one
        // fresh through a lazy read.
        if reaction.is_dirty() {
            reaction.refresh();
        }
    }
}

// =============================================================================
// DEPENDENCY INSTALLATION
// =============================================================================

/// Wire up the dependencies collected during a reaction's evaluation.
///
/// Takes the subjects recorded in the context, unhooks the reaction from
/// every subject of its previous evaluation (stale subscriptions must not
/// linger), then subscribes it to the new set.
pub fn install_dependencies(reaction: Rc<dyn AnyReaction>) {
    let new_deps = with_context(|ctx| ctx.swap_new_deps(Vec::new()));

    remove_all_deps(&reaction);

    for dep in &new_deps {
        reaction.add_dep(dep.clone());
        dep.add_dependent(Rc::downgrade(&reaction));
    }
}

/// Unhook a reaction from every subject it currently depends on.
///
/// Used on re-evaluation (before installing the fresh set) and on disposal.
pub fn remove_all_deps(reaction: &Rc<dyn AnyReaction>) {
    let deps: Vec<Rc<dyn AnySubject>> = {
        let mut collected = Vec::new();
        reaction.for_each_dep(&mut |dep| {
            collected.push(dep.clone());
            true
        });
        collected
    };

    for dep in deps {
        dep.remove_dependent(reaction);
    }

    reaction.clear_deps();
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Read observables without recording dependencies.
///
/// Useful inside a compute function for values that should not trigger
/// recomputation when they change.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    // Guard restores the previous mode even if f panics.
    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

// =============================================================================
// TESTS
// =============================================================================
