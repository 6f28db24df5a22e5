// ============================================================================
// loadout-observables - Containers
// The three observable leaf containers: cell, sequence, map
// ============================================================================

pub mod cell;
pub mod map;
pub mod sequence;

pub use cell::{cell, ObservableCell};
pub use map::{map, NotificationScope, ObservableMap};
pub use sequence::{sequence, ObservableSequence};
