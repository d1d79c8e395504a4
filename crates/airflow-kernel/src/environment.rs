//! Environment trait: the simulation and sensor side the controller drives.

use uuid::Uuid;

use crate::action::Action;
use crate::registry::StateSnapshot;

/// Stable identifier for an actuator.
pub type ActuatorId = Uuid;

/// The world the controller acts on.
///
/// Examples:
/// - A tower-defense grid where vacuums pull insects out of the air
/// - A scripted fixture in tests
///
/// The controller never advances the world. Callers step the simulation,
/// let the sensors refresh snapshots and capture counts, then call
/// [`Controller::step`](crate::Controller::step) once.
pub trait Environment {
    /// Actuators under control this tick.
    fn generators(&self) -> Vec<ActuatorId>;

    /// Cumulative captures attributed to an actuator.
    fn capture_count(&self, actuator: ActuatorId) -> u64;

    /// The actuator's state as of this tick. `None` before its first reading.
    fn current_snapshot(&self, actuator: ActuatorId) -> Option<StateSnapshot>;

    /// The actuator's state as of the previous reading.
    fn previous_snapshot(&self, actuator: ActuatorId) -> Option<StateSnapshot>;

    /// Whether the sensors saw the actuator's local state change this tick.
    fn has_state_changed(&self, actuator: ActuatorId) -> bool;

    /// Set the actuator's live direction and power.
    fn apply_action(&mut self, actuator: ActuatorId, action: &Action);

    /// Called exactly once per controller step, before any actuator is handled.
    fn notify_performance_tick(&mut self);

    /// Optional: whether this actuator is selected for detailed inspection.
    ///
    /// Selected actuators get their states and value tables logged at debug
    /// level on every decision. Default implementation selects nothing.
    fn is_selected(&self, _actuator: ActuatorId) -> bool {
        false
    }
}
