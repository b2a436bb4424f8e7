use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Thresholds and weights used by the evaluator.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// Historical completion-rate baseline used for the staking sub-score.
    pub baseline: f64,
    /// Rates at or above this are healthy.
    pub healthy_threshold: f64,
    /// Rates below this (and at or above `critical_threshold`) are poor.
    pub poor_threshold: f64,
    /// Non-zero rates below this are critical.
    pub critical_threshold: f64,
    /// Day-over-day move in percentage points that counts as sharp.
    pub sharp_move_pp: f64,
    pub max_memory_alerts: usize,
    /// Agent credited on staking alerts.
    pub reporting_agent: String,
    pub weights: MetricWeights,
    pub placeholders: PlaceholderScores,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            baseline: 34.1,
            healthy_threshold: 34.0,
            poor_threshold: 25.0,
            critical_threshold: 10.0,
            sharp_move_pp: 10.0,
            max_memory_alerts: 5,
            reporting_agent: "INSIGHT".to_string(),
            weights: MetricWeights::default(),
            placeholders: PlaceholderScores::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricWeights {
    pub staking: u32,
    pub dau: u32,
    pub retention: u32,
    pub engagement: u32,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            staking: 40,
            dau: 25,
            retention: 20,
            engagement: 15,
        }
    }
}

impl MetricWeights {
    /// Widened so oversized weights in a config file report instead of
    /// overflowing.
    pub fn total(&self) -> u64 {
        [self.staking, self.dau, self.retention, self.engagement]
            .into_iter()
            .map(u64::from)
            .sum()
    }
}

/// Estimated sub-scores for metrics that have no live feed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaceholderScores {
    pub dau: u32,
    pub retention: u32,
    pub engagement: u32,
}

impl Default for PlaceholderScores {
    fn default() -> Self {
        Self {
            dau: 70,
            retention: 68,
            engagement: 74,
        }
    }
}

impl EvaluatorConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::parse_toml(&contents)?)
    }

    pub fn parse_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.weights.total();
        if total != 100 {
            return Err(ConfigError::WeightSum(total));
        }

        if !(0.0 < self.critical_threshold
            && self.critical_threshold <= self.poor_threshold
            && self.poor_threshold <= self.healthy_threshold
            && self.healthy_threshold.is_finite())
        {
            return Err(ConfigError::Bands {
                critical: self.critical_threshold,
                poor: self.poor_threshold,
                healthy: self.healthy_threshold,
            });
        }

        if !(self.baseline.is_finite() && self.baseline > 0.0) {
            return Err(ConfigError::Baseline(self.baseline));
        }

        if !(self.sharp_move_pp.is_finite() && self.sharp_move_pp > 0.0) {
            return Err(ConfigError::SharpMove(self.sharp_move_pp));
        }

        for (name, score) in [
            ("dau", self.placeholders.dau),
            ("retention", self.placeholders.retention),
            ("engagement", self.placeholders.engagement),
        ] {
            if score > 100 {
                return Err(ConfigError::Placeholder { name, score });
            }
        }

        Ok(())
    }
}
