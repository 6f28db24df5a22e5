// ============================================================================
// loadout-observables - Errors
// ============================================================================

use thiserror::Error;

/// Hard, deterministic key errors raised at the call site.
///
/// Never retried, never swallowed: `add` on a present key and keyed reads of
/// an absent key fail immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key is already present; `add` does not overwrite.
    #[error("duplicate key")]
    DuplicateKey,

    /// The key is absent.
    #[error("missing key")]
    MissingKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(KeyError::DuplicateKey.to_string(), "duplicate key");
        assert_eq!(KeyError::MissingKey.to_string(), "missing key");
    }
}
