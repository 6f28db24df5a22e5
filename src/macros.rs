// ============================================================================
// loadout-observables - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// Observer callbacks and compute functions capture container handles by
/// value; this removes the boilerplate of cloning each handle first.
///
/// # Usage
///
/// ```rust
/// use loadout_observables::{cell, cloned, computed};
///
/// let base = cell(1);
/// let bonus = cell(2);
///
/// let total = computed(cloned!(base, bonus => move || base.get() + bonus.get()));
/// assert_eq!(total.get(), 3);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}
