// ============================================================================
// loadout-observables - Observable Game-Data Containers for Rust
// ============================================================================
//
// Cells, sequences and key/value maps that notify registered observers
// synchronously on mutation, plus computed values with automatic dependency
// tracking, resolver adapters that mirror externally-owned containers of
// different types, and batch scopes that coalesce notifications.
//
// Single-threaded by design: every notification is a direct synchronous
// call on the mutating thread, before the mutating operation returns.
// ============================================================================

pub mod containers;
pub mod core;
mod macros;
pub mod reactivity;
pub mod resolve;

// Re-export core items at crate root for ergonomic access
pub use crate::core::constants;
pub use crate::core::context::{is_tracking, is_untracking, with_context, ObserveContext};
pub use crate::core::error::KeyError;
pub use crate::core::observers::{ObserverKey, ObserverList, OwnerId};
pub use crate::core::types::{
    AnyReaction, AnySubject, BatchMember, CellCallback, MapCallback, SequenceCallback, UpdateType,
};

// Re-export containers
pub use crate::containers::cell::{cell, ObservableCell};
pub use crate::containers::map::{map, NotificationScope, ObservableMap};
pub use crate::containers::sequence::{sequence, ObservableSequence};

// Re-export resolvers
pub use crate::resolve::{CellResolver, MapResolver, SequenceResolver};

// Re-export reactivity
pub use crate::reactivity::batch::{batch, Batch, Enlistable};
pub use crate::reactivity::computed::{computed, Computed};
pub use crate::reactivity::tracking::untrack;

// =============================================================================
// TESTS
// =============================================================================
