//! DefenseGrid: a small insect-defense world for the airflow controller.
//!
//! Insects spawn along the top row and wander downward; any that walk off
//! the bottom row escape. Vacuums sit at fixed cells and watch the eight
//! surrounding cells in compass order, so the controller sees eight
//! directions and NW wraps around to N.
//!
//! Each simulation tick:
//! 1. Maybe spawn an insect
//! 2. Every powered vacuum tries to pull in insects from the cell it points at
//! 3. Surviving insects wander
//! 4. Sensors refresh every vacuum's snapshot

use anyhow::{Result, ensure};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use airflow_kernel::{Action, ActuatorId, Environment, StateSnapshot};

/// Compass directions in controller order: name, dx, dy (y grows downward).
pub const COMPASS: [(&str, i32, i32); 8] = [
    ("N", 0, -1),
    ("NE", 1, -1),
    ("E", 1, 0),
    ("SE", 1, 1),
    ("S", 0, 1),
    ("SW", -1, 1),
    ("W", -1, 0),
    ("NW", -1, -1),
];

/// Namespace UUID for deterministic vacuum IDs.
const VACUUM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x1f, 0x4e, 0x2a, 0x90, 0x5c, 0x3b, 0x4d, 0x7e, 0x9a, 0x61, 0x0b, 0xd2, 0x83, 0xc4, 0x15, 0xe6,
]);

/// Configuration for the grid world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Columns
    pub width: i32,
    /// Rows
    pub height: i32,
    /// Vacuums, spread evenly across the middle row
    pub vacuums: usize,
    /// Chance of a new insect each tick
    pub spawn_probability: f64,
    /// Power magnitude that captures with certainty
    pub full_power: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            vacuums: 3,
            spawn_probability: 0.35,
            full_power: 4,
        }
    }
}

/// An insect on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insect {
    pub x: i32,
    pub y: i32,
}

/// A vacuum tower and what its sensors last reported.
#[derive(Debug, Clone)]
pub struct Vacuum {
    pub id: ActuatorId,
    pub x: i32,
    pub y: i32,
    /// Cumulative captures
    pub captures: u64,
    current: StateSnapshot,
    previous: Option<StateSnapshot>,
    changed: bool,
    action: Option<Action>,
}

impl Vacuum {
    /// The action the controller last applied.
    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn snapshot(&self) -> &StateSnapshot {
        &self.current
    }
}

/// One entry per controller step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub tick: u64,
    pub captures: u64,
    pub escaped: u64,
    pub insects: usize,
}

/// The grid world.
#[derive(Debug)]
pub struct DefenseGrid {
    config: GridConfig,
    vacuums: Vec<Vacuum>,
    insects: Vec<Insect>,
    rng: ChaCha8Rng,
    tick: u64,
    spawned: u64,
    escaped: u64,
    performance_log: Vec<PerformanceSample>,
    selected: Option<ActuatorId>,
}

impl DefenseGrid {
    /// Build a grid with its vacuums placed and sensors primed.
    pub fn new(config: GridConfig, seed: u64) -> Result<Self> {
        ensure!(
            config.width >= 3 && config.height >= 3,
            "Grid must be at least 3x3, got {}x{}",
            config.width,
            config.height
        );
        let fits = i32::try_from(config.vacuums).is_ok_and(|count| count <= config.width);
        ensure!(
            config.vacuums >= 1 && fits,
            "Vacuum count {} does not fit a {}-wide grid",
            config.vacuums,
            config.width
        );
        ensure!(
            (0.0..=1.0).contains(&config.spawn_probability),
            "spawn_probability must be within [0, 1]"
        );
        ensure!(config.full_power >= 1, "full_power must be at least 1");

        let row = config.height / 2;
        let count = config.vacuums as i32;
        let vacuums = (0..count)
            .map(|i| {
                let x = (i + 1) * config.width / (count + 1);
                let name = format!("vacuum:{}:{}", x, row);
                let id = Uuid::new_v5(&VACUUM_NAMESPACE, name.as_bytes());
                Vacuum {
                    id,
                    x,
                    y: row,
                    captures: 0,
                    current: StateSnapshot::new(vec![0; COMPASS.len()]),
                    previous: None,
                    changed: true,
                    action: None,
                }
            })
            .collect();

        Ok(Self {
            config,
            vacuums,
            insects: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
            spawned: 0,
            escaped: 0,
            performance_log: Vec::new(),
            selected: None,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn vacuums(&self) -> &[Vacuum] {
        &self.vacuums
    }

    pub fn insects(&self) -> &[Insect] {
        &self.insects
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn escaped(&self) -> u64 {
        self.escaped
    }

    pub fn total_captures(&self) -> u64 {
        self.vacuums.iter().map(|v| v.captures).sum()
    }

    pub fn performance_log(&self) -> &[PerformanceSample] {
        &self.performance_log
    }

    /// Mark the vacuum at `index` for detailed logging.
    pub fn select(&mut self, index: usize) -> Option<ActuatorId> {
        self.selected = self.vacuums.get(index).map(|v| v.id);
        self.selected
    }

    /// Drop an insect at a cell (clamped to the grid).
    pub fn insert_insect(&mut self, x: i32, y: i32) {
        self.insects.push(Insect {
            x: x.clamp(0, self.config.width - 1),
            y: y.clamp(0, self.config.height - 1),
        });
        self.spawned += 1;
    }

    /// Advance the world by one tick.
    pub fn advance(&mut self) {
        self.tick += 1;
        self.spawn();
        self.capture();
        self.wander();
        self.refresh_sensors();
    }

    /// Insects currently in a cell.
    pub fn cell_count(&self, x: i32, y: i32) -> u32 {
        self.insects.iter().filter(|i| i.x == x && i.y == y).count() as u32
    }

    /// Re-read every vacuum's neighborhood.
    pub fn refresh_sensors(&mut self) {
        let readings: Vec<StateSnapshot> = self
            .vacuums
            .iter()
            .map(|v| {
                let cells = COMPASS
                    .iter()
                    .map(|&(_, dx, dy)| self.cell_count(v.x + dx, v.y + dy))
                    .collect();
                StateSnapshot::new(cells)
            })
            .collect();

        for (vacuum, reading) in self.vacuums.iter_mut().zip(readings) {
            let previous = std::mem::replace(&mut vacuum.current, reading);
            vacuum.changed = previous != vacuum.current;
            vacuum.previous = Some(previous);
        }
    }

    fn spawn(&mut self) {
        if self.rng.random_bool(self.config.spawn_probability) {
            let x = self.rng.random_range(0..self.config.width);
            self.insects.push(Insect { x, y: 0 });
            self.spawned += 1;
        }
    }

    fn capture(&mut self) {
        let full = self.config.full_power as f64;

        for vacuum in &mut self.vacuums {
            let Some(action) = vacuum.action else {
                continue;
            };
            if action.is_off() {
                continue;
            }
            let Some(&(_, dx, dy)) = COMPASS.get(action.direction().index()) else {
                continue;
            };

            let (tx, ty) = (vacuum.x + dx, vacuum.y + dy);
            let p = (action.magnitude() as f64 / full).min(1.0);
            let rng = &mut self.rng;

            let before = self.insects.len();
            self.insects
                .retain(|insect| !(insect.x == tx && insect.y == ty && rng.random_bool(p)));
            vacuum.captures += (before - self.insects.len()) as u64;
        }
    }

    fn wander(&mut self) {
        let width = self.config.width;
        let height = self.config.height;
        let rng = &mut self.rng;
        let mut escaped = 0;

        self.insects.retain_mut(|insect| {
            match rng.random_range(0..4) {
                0 | 1 => insect.y += 1,
                2 => insect.x = (insect.x - 1).max(0),
                _ => insect.x = (insect.x + 1).min(width - 1),
            }
            if insect.y >= height {
                escaped += 1;
                false
            } else {
                true
            }
        });

        self.escaped += escaped;
    }

    fn vacuum(&self, id: ActuatorId) -> Option<&Vacuum> {
        self.vacuums.iter().find(|v| v.id == id)
    }
}

impl Environment for DefenseGrid {
    fn generators(&self) -> Vec<ActuatorId> {
        self.vacuums.iter().map(|v| v.id).collect()
    }

    fn capture_count(&self, actuator: ActuatorId) -> u64 {
        self.vacuum(actuator).map(|v| v.captures).unwrap_or(0)
    }

    fn current_snapshot(&self, actuator: ActuatorId) -> Option<StateSnapshot> {
        self.vacuum(actuator).map(|v| v.current.clone())
    }

    fn previous_snapshot(&self, actuator: ActuatorId) -> Option<StateSnapshot> {
        self.vacuum(actuator).and_then(|v| v.previous.clone())
    }

    fn has_state_changed(&self, actuator: ActuatorId) -> bool {
        self.vacuum(actuator).is_some_and(|v| v.changed)
    }

    fn apply_action(&mut self, actuator: ActuatorId, action: &Action) {
        if !action.is_off() && action.direction().index() >= COMPASS.len() {
            warn!(
                actuator = %actuator,
                direction = action.direction().index(),
                "Direction outside the compass; ignoring action"
            );
            return;
        }
        if let Some(vacuum) = self.vacuums.iter_mut().find(|v| v.id == actuator) {
            vacuum.action = Some(*action);
        }
    }

    fn notify_performance_tick(&mut self) {
        self.performance_log.push(PerformanceSample {
            tick: self.tick,
            captures: self.total_captures(),
            escaped: self.escaped,
            insects: self.insects.len(),
        });
    }

    fn is_selected(&self, actuator: ActuatorId) -> bool {
        self.selected == Some(actuator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airflow_kernel::{ActionCatalog, Direction, PowerLevel};

    fn quiet_grid() -> DefenseGrid {
        let config = GridConfig {
            spawn_probability: 0.0,
            ..Default::default()
        };
        DefenseGrid::new(config, 11).unwrap()
    }

    #[test]
    fn test_vacuums_spread_across_middle_row() {
        let grid = quiet_grid();
        let positions: Vec<(i32, i32)> = grid.vacuums().iter().map(|v| (v.x, v.y)).collect();
        assert_eq!(positions, vec![(4, 8), (8, 8), (12, 8)]);

        let ids = grid.generators();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert!(grid.has_state_changed(ids[0]));
        assert!(grid.previous_snapshot(ids[0]).is_none());
    }

    #[test]
    fn test_rejects_tiny_grid() {
        let config = GridConfig {
            width: 2,
            ..Default::default()
        };
        assert!(DefenseGrid::new(config, 1).is_err());
    }

    #[test]
    fn test_rejects_vacuum_count_that_does_not_fit() {
        for vacuums in [0, 17, usize::MAX] {
            let config = GridConfig {
                vacuums,
                ..Default::default()
            };
            assert!(DefenseGrid::new(config, 1).is_err(), "vacuums = {}", vacuums);
        }

        // One vacuum per column is the limit
        let config = GridConfig {
            vacuums: 16,
            ..Default::default()
        };
        assert_eq!(DefenseGrid::new(config, 1).unwrap().vacuums().len(), 16);
    }

    #[test]
    fn test_sensors_count_neighbors_in_compass_order() {
        let mut grid = quiet_grid();
        let (x, y) = (grid.vacuums()[0].x, grid.vacuums()[0].y);

        grid.insert_insect(x, y - 1);
        grid.insert_insect(x, y - 1);
        grid.insert_insect(x + 1, y);
        grid.insert_insect(x - 1, y - 1);
        grid.refresh_sensors();

        let id = grid.vacuums()[0].id;
        let snapshot = grid.current_snapshot(id).unwrap();
        assert_eq!(snapshot.cells(), &[2, 0, 1, 0, 0, 0, 0, 1]);
        assert_eq!(grid.vacuums()[0].snapshot(), &snapshot);
        assert_eq!(grid.spawned(), 4);
        assert!(grid.has_state_changed(id));
        assert_eq!(grid.previous_snapshot(id).unwrap().occupancy(), 0);

        // Nothing moved: next reading is unchanged
        grid.refresh_sensors();
        assert!(!grid.has_state_changed(id));
    }

    #[test]
    fn test_full_power_captures_target_cell() {
        let mut grid = quiet_grid();
        let catalog = ActionCatalog::new(8, 4, 2);
        let vacuum = grid.vacuums()[1].clone();

        grid.insert_insect(vacuum.x + 1, vacuum.y);
        grid.insert_insect(vacuum.x, vacuum.y + 1);

        let east = catalog.find(Direction(2), PowerLevel::Full).unwrap();
        grid.apply_action(vacuum.id, &east);
        grid.capture();

        assert_eq!(grid.capture_count(vacuum.id), 1);
        assert_eq!(grid.insects(), &[Insect { x: vacuum.x, y: vacuum.y + 1 }]);
    }

    #[test]
    fn test_off_captures_nothing() {
        let mut grid = quiet_grid();
        let catalog = ActionCatalog::new(8, 4, 2);
        let vacuum = grid.vacuums()[0].clone();

        grid.insert_insect(vacuum.x, vacuum.y - 1);
        grid.apply_action(vacuum.id, &catalog.off());
        grid.capture();

        assert_eq!(grid.total_captures(), 0);
        assert_eq!(grid.insects().len(), 1);
    }

    #[test]
    fn test_out_of_compass_direction_ignored() {
        let mut grid = quiet_grid();
        let wide = ActionCatalog::new(12, 4, 2);
        let id = grid.vacuums()[0].id;

        grid.apply_action(id, &wide.actions()[20]);
        assert!(grid.vacuums()[0].action().is_none());
    }

    #[test]
    fn test_insects_eventually_escape() {
        let mut grid = quiet_grid();
        grid.insert_insect(0, 15);

        for _ in 0..200 {
            grid.wander();
        }

        assert_eq!(grid.escaped(), 1);
        assert!(grid.insects().is_empty());
    }

    #[test]
    fn test_performance_log() {
        let mut grid = quiet_grid();
        grid.advance();
        grid.notify_performance_tick();
        grid.advance();
        grid.notify_performance_tick();

        let log = grid.performance_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].tick, 2);
        assert_eq!(log[1].captures, 0);
    }

    #[test]
    fn test_select() {
        let mut grid = quiet_grid();
        let id = grid.select(2).unwrap();
        assert!(grid.is_selected(id));
        assert!(!grid.is_selected(grid.vacuums()[0].id));
        assert!(grid.select(9).is_none());
    }
}
