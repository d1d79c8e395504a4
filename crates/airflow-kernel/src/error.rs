//! Faults the controller reports and recovers from.

use thiserror::Error;

/// Integration faults. Neither is expected in correct operation; the
/// controller logs them and skips only the affected update or actuator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlFault {
    /// An action handed to a value table is not one of its candidates.
    #[error("action slot {slot} is not in the value table ({slots} slots); ignoring reward")]
    UnknownActionReward { slot: usize, slots: usize },

    /// The actuator's previous action cannot be located in the catalog.
    #[error("previous action slot {slot} is not in the action catalog; skipping reward")]
    MissingPreviousActionSlot { slot: usize },
}
