// ============================================================================
// loadout-observables - Observe Context
// Thread-local state for the current dependency-tracking scope
// ============================================================================
//
// Automatic dependency discovery works by recording reads: while a computed's
// function runs, every observable read through a getter registers itself
// here. Saving and restoring the active reaction around each evaluation is
// what makes the context a reentrant tracking stack (a computed read inside
// another computed's evaluation tracks into the inner one only).
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::{AnyReaction, AnySubject};

// =============================================================================
// OBSERVE CONTEXT
// =============================================================================

/// Thread-local context holding the active tracking state.
pub struct ObserveContext {
    /// Reaction currently evaluating (the tracking target), if any
    active_reaction: RefCell<Option<Weak<dyn AnyReaction>>>,

    /// Whether reads are currently exempt from tracking
    untracking: Cell<bool>,

    /// Subjects read so far by the active reaction's evaluation
    new_deps: RefCell<Vec<Rc<dyn AnySubject>>>,
}

impl ObserveContext {
    /// Create a new context with no active tracking scope.
    pub fn new() -> Self {
        Self {
            active_reaction: RefCell::new(None),
            untracking: Cell::new(false),
            new_deps: RefCell::new(Vec::new()),
        }
    }

    // =========================================================================
    // ACTIVE REACTION
    // =========================================================================

    /// Replace the active reaction, returning the previous one.
    ///
    /// Callers restore the returned value when their evaluation ends; the
    /// save/restore pairing is the tracking stack.
    pub fn set_active_reaction(
        &self,
        reaction: Option<Weak<dyn AnyReaction>>,
    ) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.replace(reaction)
    }

    /// Get the active reaction
    pub fn get_active_reaction(&self) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.borrow().clone()
    }

    /// Check if a tracking scope is open
    pub fn has_active_reaction(&self) -> bool {
        self.active_reaction.borrow().is_some()
    }

    /// Set untracking mode, returning the previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    /// Check if currently untracking
    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    // =========================================================================
    // COLLECTED DEPENDENCIES
    // =========================================================================

    /// Swap out the collected-deps list, returning the old one.
    ///
    /// Used to save/restore collection state around nested evaluations.
    pub fn swap_new_deps(&self, deps: Vec<Rc<dyn AnySubject>>) -> Vec<Rc<dyn AnySubject>> {
        self.new_deps.replace(deps)
    }

    /// Record a subject read by the active reaction, deduplicating by
    /// allocation identity.
    pub fn add_new_dep(&self, subject: Rc<dyn AnySubject>) {
        let mut deps = self.new_deps.borrow_mut();
        let ptr = Rc::as_ptr(&subject) as *const ();
        if !deps.iter().any(|d| Rc::as_ptr(d) as *const () == ptr) {
            deps.push(subject);
        }
    }

    /// Number of subjects collected so far
    pub fn new_dep_count(&self) -> usize {
        self.new_deps.borrow().len()
    }
}

impl Default for ObserveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ObserveContext = ObserveContext::new();
}

/// Access the thread-local observe context.
pub fn with_context<R>(f: impl FnOnce(&ObserveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Check if reads are currently being tracked (inside a computed's
/// evaluation and not untracking).
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction() && !ctx.is_untracking())
}

/// Check if currently inside an `untrack` scope.
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AnySubject;
    use crate::core::constants::CELL;
    use std::any::Any;

    struct DummySubject {
        flags: Cell<u32>,
    }

    impl AnySubject for DummySubject {
        fn flags(&self) -> u32 {
            self.flags.get()
        }
        fn set_flags(&self, flags: u32) {
            self.flags.set(flags);
        }
        fn dependent_count(&self) -> usize {
            0
        }
        fn add_dependent(&self, _reaction: Weak<dyn AnyReaction>) {}
        fn remove_dependent(&self, _reaction: &Rc<dyn AnyReaction>) {}
        fn cleanup_dead_dependents(&self) {}
        fn for_each_dependent(&self, _f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool) {}
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn context_starts_idle() {
        with_context(|ctx| {
            assert!(!ctx.has_active_reaction());
            assert!(!ctx.is_untracking());
            assert_eq!(ctx.new_dep_count(), 0);
        });
        assert!(!is_tracking());
        assert!(!is_untracking());
    }

    #[test]
    fn untracking_flag_roundtrip() {
        with_context(|ctx| {
            let prev = ctx.set_untracking(true);
            assert!(!prev);
            assert!(ctx.is_untracking());

            let prev = ctx.set_untracking(false);
            assert!(prev);
            assert!(!ctx.is_untracking());
        });
    }

    #[test]
    fn collected_deps_deduplicate_by_identity() {
        with_context(|ctx| {
            let subject: Rc<dyn AnySubject> = Rc::new(DummySubject {
                flags: Cell::new(CELL),
            });

            ctx.add_new_dep(subject.clone());
            ctx.add_new_dep(subject.clone());
            assert_eq!(ctx.new_dep_count(), 1);

            let other: Rc<dyn AnySubject> = Rc::new(DummySubject {
                flags: Cell::new(CELL),
            });
            ctx.add_new_dep(other);
            assert_eq!(ctx.new_dep_count(), 2);

            ctx.swap_new_deps(Vec::new());
        });
    }

    #[test]
    fn swap_new_deps_restores_previous_collection() {
        with_context(|ctx| {
            let subject: Rc<dyn AnySubject> = Rc::new(DummySubject {
                flags: Cell::new(CELL),
            });
            ctx.add_new_dep(subject);

            let saved = ctx.swap_new_deps(Vec::new());
            assert_eq!(saved.len(), 1);
            assert_eq!(ctx.new_dep_count(), 0);

            ctx.swap_new_deps(saved);
            assert_eq!(ctx.new_dep_count(), 1);

            ctx.swap_new_deps(Vec::new());
        });
    }
}
