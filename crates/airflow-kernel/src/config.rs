//! Configuration types for the controller.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Top-level controller configuration.
///
/// Defines the action catalog, the selection policy and the reward schedule.
/// Loaded from JSON at runtime; any omitted field takes its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Shape of the candidate action set
    pub catalog: CatalogConfig,

    /// Probability of ignoring the value estimates and picking uniformly
    pub explore_probability: f64,

    /// Consecutive unchanged ticks before a settled actuator is reconsidered
    pub settle_ticks: u32,

    /// Share of a capture reward credited to each angular neighbor
    pub neighbor_reward_fraction: f64,

    /// Capture rewards keyed by the rewarded action's power magnitude
    pub capture_rewards: CaptureRewardConfig,

    /// Rewards that do not depend on a capture
    pub shaping: ShapingConfig,

    /// Seed for the selection RNG (random when absent)
    pub seed: Option<u64>,
}

/// Shape of the action catalog: direction count and the two tier magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Number of flow directions the actuator supports
    pub directions: usize,

    /// Magnitude of the full tier
    pub full_power: u32,

    /// Magnitude of the half tier
    pub half_power: u32,
}

/// Capture reward lookup.
///
/// Only the full and half magnitudes are ever produced by the catalog, so with
/// the defaults just the `4` and `2` entries are reachable. The `1` and `3`
/// entries and the fallback are kept for catalogs with other magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRewardConfig {
    /// Reward per power magnitude
    pub by_magnitude: BTreeMap<u32, f64>,

    /// Reward for magnitudes missing from `by_magnitude` (including off)
    pub default_reward: f64,
}

impl CaptureRewardConfig {
    /// Base capture reward for an action running at `magnitude`.
    pub fn reward_for(&self, magnitude: u32) -> f64 {
        self.by_magnitude
            .get(&magnitude)
            .copied()
            .unwrap_or(self.default_reward)
    }
}

/// Shaping rewards applied on every reconsideration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// Credit for staying off while nothing is nearby
    pub idle_off_bonus: f64,

    /// Credit to every powered action while targets are nearby but nothing was captured
    pub pending_effort_bonus: f64,

    /// Credit (negative) for staying off while targets are nearby
    pub pending_off_penalty: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            explore_probability: 0.2,
            settle_ticks: 5,
            neighbor_reward_fraction: 0.5,
            capture_rewards: CaptureRewardConfig::default(),
            shaping: ShapingConfig::default(),
            seed: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            directions: 8,
            full_power: 4,
            half_power: 2,
        }
    }
}

impl Default for CaptureRewardConfig {
    fn default() -> Self {
        Self {
            by_magnitude: BTreeMap::from([(2, 16.0), (4, 12.0), (1, 18.0), (3, 14.0)]),
            default_reward: 10.0,
        }
    }
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            idle_off_bonus: 5.0,
            pending_effort_bonus: 1.0,
            pending_off_penalty: -5.0,
        }
    }
}

impl ControllerConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading controller config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing controller config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.explore_probability),
            "explore_probability must be within [0, 1], got {}",
            self.explore_probability
        );
        ensure!(self.settle_ticks >= 1, "settle_ticks must be at least 1");
        ensure!(
            self.neighbor_reward_fraction.is_finite(),
            "neighbor_reward_fraction must be finite"
        );
        ensure!(
            self.catalog.directions >= 1,
            "catalog needs at least one direction"
        );
        ensure!(
            self.catalog.half_power >= 1 && self.catalog.half_power <= self.catalog.full_power,
            "power tiers must satisfy 1 <= half ({}) <= full ({})",
            self.catalog.half_power,
            self.catalog.full_power
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capture_rewards() {
        let rewards = CaptureRewardConfig::default();
        assert_eq!(rewards.reward_for(4), 12.0);
        assert_eq!(rewards.reward_for(2), 16.0);
        assert_eq!(rewards.reward_for(3), 14.0);
        assert_eq!(rewards.reward_for(1), 18.0);
        assert_eq!(rewards.reward_for(0), 10.0);
        assert_eq!(rewards.reward_for(7), 10.0);
    }

    #[test]
    fn test_default_is_valid() {
        ControllerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let config = ControllerConfig {
            explore_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_tiers() {
        let config = ControllerConfig {
            catalog: CatalogConfig {
                directions: 4,
                full_power: 2,
                half_power: 4,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_directions() {
        let config = ControllerConfig {
            catalog: CatalogConfig {
                directions: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    /// Write `json` to a fresh temp file and return its path.
    fn temp_config(json: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("controller-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_from_json_file_loads_and_validates() {
        let path = temp_config(r#"{ "settle_ticks": 3, "seed": 11 }"#);
        let config = ControllerConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.settle_ticks, 3);
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.catalog.directions, 8);
    }

    #[test]
    fn test_from_json_file_rejects_invalid_settings() {
        let path = temp_config(r#"{ "settle_ticks": 0 }"#);
        let result = ControllerConfig::from_json_file(&path);
        std::fs::remove_file(&path).unwrap();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("settle_ticks"));
    }

    #[test]
    fn test_from_json_file_reports_path() {
        let missing = std::env::temp_dir().join(format!("missing-{}.json", uuid::Uuid::new_v4()));
        let err = ControllerConfig::from_json_file(&missing).unwrap_err();
        assert!(err.to_string().contains("reading controller config"));

        let path = temp_config("{ not json");
        let err = ControllerConfig::from_json_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("parsing controller config"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ControllerConfig = serde_json::from_str(
            r#"{ "explore_probability": 0.1, "catalog": { "directions": 4 }, "seed": 7 }"#,
        )
        .unwrap();

        assert_eq!(config.explore_probability, 0.1);
        assert_eq!(config.catalog.directions, 4);
        assert_eq!(config.catalog.full_power, 4);
        assert_eq!(config.settle_ticks, 5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.capture_rewards.reward_for(2), 16.0);
    }

    #[test]
    fn test_magnitude_keys_from_json() {
        let rewards: CaptureRewardConfig =
            serde_json::from_str(r#"{ "by_magnitude": { "6": 20.0 }, "default_reward": 3.0 }"#)
                .unwrap();
        assert_eq!(rewards.reward_for(6), 20.0);
        assert_eq!(rewards.reward_for(4), 3.0);
    }
}
