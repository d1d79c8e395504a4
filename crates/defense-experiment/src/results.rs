//! Results collection and output for defense grid runs.
//!
//! Captures metrics like:
//! - Captures versus escapes over the whole run
//! - Capture rate early and late in the run (did the controller learn?)
//! - Distinct states the controller has tables for
//! - Per-vacuum capture totals

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration a run was made with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Trial number (for repeated runs)
    pub trial: usize,
    /// Seed for the grid world
    pub seed: u64,
    /// Seed the controller's selection RNG started from
    pub controller_seed: u64,
    pub ticks: usize,
    pub width: i32,
    pub height: i32,
    pub vacuums: usize,
    pub spawn_probability: f64,
    pub explore_probability: f64,
}

/// Metrics for a single tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickMetrics {
    pub tick: usize,
    /// Cumulative captures
    pub captures: u64,
    /// Cumulative escapes
    pub escaped: u64,
    /// Insects on the grid after the tick
    pub insects: usize,
    pub evaluated: usize,
    pub settling: usize,
    pub pending: usize,
    pub reward_updates: usize,
    pub known_states: usize,
}

/// Final tally for one vacuum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacuumSummary {
    pub id: Uuid,
    pub x: i32,
    pub y: i32,
    pub captures: u64,
}

/// Results from a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub config: RunConfig,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Insects that entered the grid
    pub total_spawned: u64,
    pub total_captures: u64,
    pub total_escaped: u64,
    /// captures / (captures + escapes), 0 when nothing was resolved
    pub capture_rate: f64,
    /// Capture rate over the first quarter of the run
    pub early_capture_rate: f64,
    /// Capture rate over the last quarter of the run
    pub late_capture_rate: f64,
    pub known_states: usize,
    /// Value-table updates across every state
    pub total_attempts: u64,
    pub faults: usize,
    pub vacuums: Vec<VacuumSummary>,
    pub tick_metrics: Vec<TickMetrics>,
}

/// Capture rate between two cumulative readings.
pub fn capture_rate(captures: u64, escaped: u64) -> f64 {
    let resolved = captures + escaped;
    if resolved == 0 {
        0.0
    } else {
        captures as f64 / resolved as f64
    }
}

/// Capture rate over the ticks in `window`, from cumulative counters.
pub fn window_capture_rate(metrics: &[TickMetrics], window: std::ops::Range<usize>) -> f64 {
    let end = window.end.min(metrics.len());
    if window.start >= end {
        return 0.0;
    }
    let (base_captures, base_escaped) = match window.start {
        0 => (0, 0),
        s => (metrics[s - 1].captures, metrics[s - 1].escaped),
    };
    let last = &metrics[end - 1];
    capture_rate(
        last.captures.saturating_sub(base_captures),
        last.escaped.saturating_sub(base_escaped),
    )
}

/// Aggregate results over repeated trials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialResults {
    /// All individual results
    pub results: Vec<ExperimentResult>,
    pub summary: Option<TrialSummary>,
}

/// Summary statistics over trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialSummary {
    pub trials: usize,
    pub mean_capture_rate: f64,
    /// Standard error of the mean capture rate
    pub capture_rate_se: f64,
    /// 95% confidence interval for capture rate: (lower, upper)
    pub capture_rate_ci: (f64, f64),
    pub mean_early_capture_rate: f64,
    pub mean_late_capture_rate: f64,
    pub mean_captures: f64,
    pub mean_escaped: f64,
    pub mean_known_states: f64,
}

impl TrialResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: ExperimentResult) {
        self.results.push(result);
    }

    /// Compute summary statistics. Leaves `summary` empty with no results.
    pub fn compute_summary(&mut self) {
        let trials = self.results.len();
        if trials == 0 {
            self.summary = None;
            return;
        }
        let n = trials as f64;
        let mean =
            |f: &dyn Fn(&ExperimentResult) -> f64| self.results.iter().map(f).sum::<f64>() / n;

        let mean_capture_rate = mean(&|r| r.capture_rate);

        // SE = std_dev / sqrt(n)
        let capture_rate_se = if trials > 1 {
            let variance = self
                .results
                .iter()
                .map(|r| (r.capture_rate - mean_capture_rate).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            variance.sqrt() / n.sqrt()
        } else {
            0.0
        };

        // 95% CI, clamped to [0, 1]
        let z = 1.96;
        let capture_rate_ci = (
            (mean_capture_rate - z * capture_rate_se).max(0.0),
            (mean_capture_rate + z * capture_rate_se).min(1.0),
        );

        self.summary = Some(TrialSummary {
            trials,
            mean_capture_rate,
            capture_rate_se,
            capture_rate_ci,
            mean_early_capture_rate: mean(&|r| r.early_capture_rate),
            mean_late_capture_rate: mean(&|r| r.late_capture_rate),
            mean_captures: mean(&|r| r.total_captures as f64),
            mean_escaped: mean(&|r| r.total_escaped as f64),
            mean_known_states: mean(&|r| r.known_states as f64),
        });
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read results from {}", path.display()))?;
        let results = serde_json::from_str(&json)?;
        Ok(results)
    }
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}
