// ============================================================================
// loadout-observables - Core Module
// Fundamental types, traits, and context for the observable system
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;
pub mod observers;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use context::{is_tracking, is_untracking, with_context, ObserveContext};
pub use error::KeyError;
pub use observers::{ObserverKey, ObserverList, OwnerId};
pub use types::{
    AnyReaction, AnySubject, BatchMember, CellCallback, MapCallback, SequenceCallback, UpdateType,
};
