// ============================================================================
// loadout-observables - Constants
// Flag constants shared by containers, computed values and batches
// ============================================================================

// =============================================================================
// CONTAINER TYPE FLAGS
// =============================================================================

/// Single-value observable cell
pub const CELL: u32 = 1 << 0;

/// Ordered, index-addressed observable sequence
pub const SEQUENCE: u32 = 1 << 1;

/// Key/value observable map
pub const MAP: u32 = 1 << 2;

/// Derived (computed) value
pub const COMPUTED: u32 = 1 << 3;

// =============================================================================
// STATE FLAGS
// =============================================================================

/// Cached value is up to date
pub const CLEAN: u32 = 1 << 8;

/// Cached value must be recomputed before the next read
pub const DIRTY: u32 = 1 << 9;

/// Enlisted in an open batch: observer dispatch is deferred to flush
pub const SUPPRESSED: u32 = 1 << 10;

/// Compute function is currently on the stack (cycle detection)
pub const COMPUTING: u32 = 1 << 11;

/// Disposed: upstream subscriptions released, invalidations ignored
pub const DESTROYED: u32 = 1 << 12;

// =============================================================================
// STATUS MASK
// =============================================================================

/// Mask that clears the CLEAN/DIRTY status bits
pub const STATUS_MASK: u32 = !(CLEAN | DIRTY);

// =============================================================================
// TESTS
// =============================================================================
