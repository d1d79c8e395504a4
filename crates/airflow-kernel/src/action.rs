//! Action catalog: the fixed, ordered candidate set shared by every value table.
//!
//! For `D` directions the slots are laid out as:
//! - slot `2d`     → direction `d` at full power
//! - slot `2d + 1` → direction `d` at half power
//! - slot `2D`     → the single off action
//!
//! Reward propagation treats directional slots two apart (with wraparound)
//! as angular neighbors of the same tier, so this layout must not change.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;

/// Index into the engine's direction enumeration.
///
/// The enumeration order is significant: consecutive indices are treated as
/// angularly adjacent, and the last index wraps around to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Direction(pub usize);

impl Direction {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Power setting of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLevel {
    Full,
    Half,
    Off,
}

/// A candidate action from the catalog.
///
/// Actions are only minted by [`ActionCatalog`]; the slot is the action's
/// identity and every lookup goes through it. Two catalogs built with
/// different parameters can produce actions that share a slot, which is why
/// [`ActionCatalog::slot_of`] also checks the remaining fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    slot: usize,
    direction: Direction,
    power: PowerLevel,
    magnitude: u32,
}

impl Action {
    /// Position of this action in the canonical order.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn power(&self) -> PowerLevel {
        self.power
    }

    /// Raw power setting handed to the actuator (0 when off).
    pub fn magnitude(&self) -> u32 {
        self.magnitude
    }

    pub fn is_off(&self) -> bool {
        self.power == PowerLevel::Off
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.power {
            PowerLevel::Off => write!(f, "#{} off", self.slot),
            PowerLevel::Full => write!(
                f,
                "#{} dir {} full ({})",
                self.slot, self.direction.0, self.magnitude
            ),
            PowerLevel::Half => write!(
                f,
                "#{} dir {} half ({})",
                self.slot, self.direction.0, self.magnitude
            ),
        }
    }
}

/// Neighbor slots of a directional slot: the same tier one direction
/// counter-clockwise and one direction clockwise.
///
/// Returns `None` for the off slot and anything past it.
pub fn neighbor_slots(directions: usize, slot: usize) -> Option<[usize; 2]> {
    let span = 2 * directions;
    if slot >= span {
        return None;
    }
    Some([(slot + span - 2) % span, (slot + 2) % span])
}

/// The ordered candidate list. Cheap to clone; the list itself is shared.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    actions: Arc<[Action]>,
    directions: usize,
}

impl ActionCatalog {
    /// Build the canonical order for `directions` directions.
    pub fn new(directions: usize, full_power: u32, half_power: u32) -> Self {
        let mut actions = Vec::with_capacity(2 * directions + 1);

        for d in 0..directions {
            actions.push(Action {
                slot: actions.len(),
                direction: Direction(d),
                power: PowerLevel::Full,
                magnitude: full_power,
            });
            actions.push(Action {
                slot: actions.len(),
                direction: Direction(d),
                power: PowerLevel::Half,
                magnitude: half_power,
            });
        }

        // Off carries the first direction; the actuator ignores it at zero power.
        actions.push(Action {
            slot: actions.len(),
            direction: Direction(0),
            power: PowerLevel::Off,
            magnitude: 0,
        });

        Self {
            actions: actions.into(),
            directions,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.directions, config.full_power, config.half_power)
    }

    /// All candidates in canonical order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Shared handle to the candidate list, used as the template for tables.
    pub fn shared(&self) -> Arc<[Action]> {
        Arc::clone(&self.actions)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Always false: the off action is present even with zero directions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn directions(&self) -> usize {
        self.directions
    }

    pub fn get(&self, slot: usize) -> Option<&Action> {
        self.actions.get(slot)
    }

    pub fn off_slot(&self) -> usize {
        2 * self.directions
    }

    pub fn off(&self) -> Action {
        self.actions[self.off_slot()]
    }

    /// Action at `direction` and `power`, if the catalog has one.
    pub fn find(&self, direction: Direction, power: PowerLevel) -> Option<Action> {
        self.actions
            .iter()
            .find(|a| a.power == power && (power == PowerLevel::Off || a.direction == direction))
            .copied()
    }

    /// Resolve an action to its slot in this catalog.
    pub fn slot_of(&self, action: &Action) -> Option<usize> {
        self.actions
            .get(action.slot)
            .filter(|candidate| *candidate == action)
            .map(|candidate| candidate.slot)
    }

    /// Same-tier angular neighbors of `slot`. `None` for the off slot.
    pub fn neighbors(&self, slot: usize) -> Option<[usize; 2]> {
        neighbor_slots(self.directions, slot)
    }

    /// Every candidate except off.
    pub fn directional(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| !a.is_off())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let catalog = ActionCatalog::new(4, 4, 2);
        assert_eq!(catalog.len(), 9);

        for d in 0..4 {
            let full = catalog.get(2 * d).unwrap();
            assert_eq!(full.direction(), Direction(d));
            assert_eq!(full.power(), PowerLevel::Full);
            assert_eq!(full.magnitude(), 4);

            let half = catalog.get(2 * d + 1).unwrap();
            assert_eq!(half.direction(), Direction(d));
            assert_eq!(half.power(), PowerLevel::Half);
            assert_eq!(half.magnitude(), 2);
        }

        let off = catalog.off();
        assert_eq!(off.slot(), 8);
        assert!(off.is_off());
        assert_eq!(off.magnitude(), 0);
    }

    #[test]
    fn test_slots_match_positions() {
        let catalog = ActionCatalog::new(8, 4, 2);
        for (i, action) in catalog.actions().iter().enumerate() {
            assert_eq!(action.slot(), i);
            assert_eq!(catalog.slot_of(action), Some(i));
        }
    }

    #[test]
    fn test_foreign_action_not_resolved() {
        let small = ActionCatalog::new(2, 4, 2);
        let large = ActionCatalog::new(4, 4, 2);

        // Slot 4 is off in the small catalog but a directional action in the large one.
        let foreign = small.off();
        assert_eq!(large.slot_of(&foreign), None);

        // Out of range entirely.
        let far = large.get(8).copied().unwrap();
        assert_eq!(small.slot_of(&far), None);
    }

    #[test]
    fn test_neighbors_wrap_around() {
        let catalog = ActionCatalog::new(4, 4, 2);
        assert_eq!(catalog.neighbors(0), Some([6, 2]));
        assert_eq!(catalog.neighbors(1), Some([7, 3]));
        assert_eq!(catalog.neighbors(2), Some([0, 4]));
        assert_eq!(catalog.neighbors(7), Some([5, 1]));
        assert_eq!(catalog.neighbors(8), None);
    }

    #[test]
    fn test_neighbors_symmetric_and_in_range() {
        for directions in 1..=9 {
            let catalog = ActionCatalog::new(directions, 4, 2);
            let span = 2 * directions;

            for slot in 0..span {
                let pair = catalog.neighbors(slot).unwrap();
                for n in pair {
                    assert!(n < span, "neighbor {} out of range for D={}", n, directions);
                    assert_ne!(n, catalog.off_slot());
                    // Same tier
                    assert_eq!(n % 2, slot % 2);
                    // Symmetric
                    assert!(catalog.neighbors(n).unwrap().contains(&slot));
                }
            }
        }
    }

    #[test]
    fn test_find() {
        let catalog = ActionCatalog::new(8, 4, 2);
        let action = catalog.find(Direction(3), PowerLevel::Half).unwrap();
        assert_eq!(action.slot(), 7);
        assert_eq!(catalog.find(Direction(5), PowerLevel::Off), Some(catalog.off()));
        assert_eq!(catalog.find(Direction(9), PowerLevel::Full), None);
    }

    #[test]
    fn test_zero_directions_has_only_off() {
        let catalog = ActionCatalog::new(0, 4, 2);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.off().is_off());
        assert_eq!(catalog.neighbors(0), None);
        assert_eq!(catalog.directional().count(), 0);
    }
}
