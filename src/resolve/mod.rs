// ============================================================================
// loadout-observables - Resolvers
// Adapters mirroring externally-owned containers of different types
// ============================================================================

pub mod cell;
pub mod map;
pub mod sequence;

pub use cell::CellResolver;
pub use map::MapResolver;
pub use sequence::SequenceResolver;
