//! Experiment runner: drives a DefenseGrid with the airflow controller.
//!
//! Each tick advances the world, then gives the controller one step to
//! credit rewards and pick new actions. Runs are fully determined by the
//! grid seed and the controller seed.

use std::time::Instant;

use anyhow::{Result, ensure};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use airflow_kernel::{Controller, ControllerConfig};

use crate::grid::{COMPASS, DefenseGrid, GridConfig};
use crate::results::{
    ExperimentResult, RunConfig, TickMetrics, VacuumSummary, capture_rate, window_capture_rate,
};

/// Mixed into the grid seed when the controller config carries no seed of its own.
const CONTROLLER_SEED_SALT: u64 = 0x5eed_a1f0_c0de_0001;

/// Configuration for the experiment runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentRunnerConfig {
    pub grid: GridConfig,
    pub controller: ControllerConfig,
    /// Ticks per run
    pub ticks: usize,
    /// Simulated milliseconds per tick
    pub tick_ms: u64,
    /// Vacuum index to log in detail
    pub watch: Option<usize>,
}

impl Default for ExperimentRunnerConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            controller: ControllerConfig::default(),
            ticks: 2000,
            tick_ms: 50,
            watch: None,
        }
    }
}

/// Runs single experiments.
pub struct ExperimentRunner {
    config: ExperimentRunnerConfig,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentRunnerConfig {
        &self.config
    }

    /// Run one trial on a grid seeded with `seed`.
    pub fn run(&self, trial: usize, seed: u64) -> Result<ExperimentResult> {
        ensure!(
            self.config.controller.catalog.directions == COMPASS.len(),
            "The defense grid has {} directions, controller is configured for {}",
            COMPASS.len(),
            self.config.controller.catalog.directions
        );

        let started_at = Utc::now();
        let start_time = Instant::now();

        let mut grid = DefenseGrid::new(self.config.grid.clone(), seed)?;
        if let Some(index) = self.config.watch
            && grid.select(index).is_none()
        {
            warn!(index, vacuums = grid.vacuums().len(), "No vacuum to watch at index");
        }

        let controller_config = ControllerConfig {
            seed: Some(
                self.config
                    .controller
                    .seed
                    .unwrap_or(seed ^ CONTROLLER_SEED_SALT),
            ),
            ..self.config.controller.clone()
        };
        let mut controller = Controller::new(controller_config)?;

        info!(
            trial,
            seed,
            controller_seed = controller.seed(),
            ticks = self.config.ticks,
            vacuums = grid.vacuums().len(),
            "Starting run"
        );

        let mut tick_metrics = Vec::with_capacity(self.config.ticks);
        let mut faults = 0;

        for tick in 1..=self.config.ticks {
            grid.advance();
            let step = controller.step(&mut grid, self.config.tick_ms);
            faults += step.faults;

            tick_metrics.push(TickMetrics {
                tick,
                captures: grid.total_captures(),
                escaped: grid.escaped(),
                insects: grid.insects().len(),
                evaluated: step.evaluated,
                settling: step.settling,
                pending: step.pending,
                reward_updates: step.reward_updates,
                known_states: step.known_states,
            });

            if tick % 500 == 0 {
                debug!(
                    tick,
                    captures = grid.total_captures(),
                    escaped = grid.escaped(),
                    known_states = step.known_states,
                    "Progress"
                );
            }
        }

        let ended_at = Utc::now();
        let duration_ms = start_time.elapsed().as_millis() as u64;

        let total_captures = grid.total_captures();
        let total_escaped = grid.escaped();
        let quarter = self.config.ticks / 4;

        let result = ExperimentResult {
            config: RunConfig {
                trial,
                seed,
                controller_seed: controller.seed(),
                ticks: self.config.ticks,
                width: self.config.grid.width,
                height: self.config.grid.height,
                vacuums: self.config.grid.vacuums,
                spawn_probability: self.config.grid.spawn_probability,
                explore_probability: self.config.controller.explore_probability,
            },
            started_at,
            ended_at,
            duration_ms,
            total_spawned: grid.spawned(),
            total_captures,
            total_escaped,
            capture_rate: capture_rate(total_captures, total_escaped),
            early_capture_rate: window_capture_rate(&tick_metrics, 0..quarter),
            late_capture_rate: window_capture_rate(
                &tick_metrics,
                self.config.ticks - quarter..self.config.ticks,
            ),
            known_states: controller.registry().len(),
            total_attempts: controller.registry().total_attempts(),
            faults,
            vacuums: grid
                .vacuums()
                .iter()
                .map(|v| VacuumSummary {
                    id: v.id,
                    x: v.x,
                    y: v.y,
                    captures: v.captures,
                })
                .collect(),
            tick_metrics,
        };

        info!(
            trial,
            captures = result.total_captures,
            escaped = result.total_escaped,
            capture_rate = format!("{:.3}", result.capture_rate),
            known_states = result.known_states,
            "Run complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> ExperimentRunnerConfig {
        ExperimentRunnerConfig {
            ticks: 300,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_direction_mismatch() {
        let mut config = short_config();
        config.controller.catalog.directions = 4;
        let runner = ExperimentRunner::new(config);
        assert!(runner.run(0, 1).is_err());
    }

    #[test]
    fn test_run_is_reproducible() {
        let runner = ExperimentRunner::new(short_config());
        let a = runner.run(0, 42).unwrap();
        let b = runner.run(0, 42).unwrap();

        assert_eq!(a.total_captures, b.total_captures);
        assert_eq!(a.total_escaped, b.total_escaped);
        assert_eq!(a.known_states, b.known_states);
        assert_eq!(a.config.controller_seed, b.config.controller_seed);
    }

    #[test]
    fn test_run_records_every_tick() {
        let runner = ExperimentRunner::new(short_config());
        let result = runner.run(3, 7).unwrap();

        assert_eq!(result.tick_metrics.len(), 300);
        assert_eq!(result.tick_metrics[299].tick, 300);
        assert_eq!(result.vacuums.len(), 3);
        assert_eq!(result.faults, 0);
        assert!(result.known_states >= 1);
        assert_eq!(
            result.vacuums.iter().map(|v| v.captures).sum::<u64>(),
            result.total_captures
        );
        assert!((0.0..=1.0).contains(&result.capture_rate));

        // Every insect that entered is captured, escaped or still on the grid
        let remaining = result.tick_metrics[299].insects as u64;
        assert_eq!(
            result.total_spawned,
            result.total_captures + result.total_escaped + remaining
        );
    }

    #[test]
    fn test_fixed_controller_seed_is_used() {
        let mut config = short_config();
        config.controller.seed = Some(1234);
        let result = ExperimentRunner::new(config).run(0, 5).unwrap();
        assert_eq!(result.config.controller_seed, 1234);
    }
}
