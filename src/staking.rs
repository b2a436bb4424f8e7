//! Rate normalization and the status rule table.

use std::fmt;

use serde::Serialize;

use crate::config::EvaluatorConfig;
use crate::models::{AlertLevel, StakingRecord};

/// Bring a raw completion rate onto the 0-100 scale.
///
/// Values above 1 are already percentages; anything else is a fraction.
pub fn normalize_rate(raw: f64) -> f64 {
    if raw > 1.0 {
        raw
    } else {
        raw * 100.0
    }
}

/// Completion rate as a percentage, 0 when nobody started the flow.
pub fn rate_from_counts(starts: u32, completions: u32) -> f64 {
    if starts == 0 {
        return 0.0;
    }
    f64::from(completions) * 100.0 / f64::from(starts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StakingStatus {
    Blackout,
    Critical,
    Poor,
    BelowBaseline,
    Healthy,
}

impl StakingStatus {
    pub fn classify(rate: f64, config: &EvaluatorConfig) -> Self {
        if rate <= 0.0 {
            Self::Blackout
        } else if rate < config.critical_threshold {
            Self::Critical
        } else if rate < config.poor_threshold {
            Self::Poor
        } else if rate < config.healthy_threshold {
            Self::BelowBaseline
        } else {
            Self::Healthy
        }
    }

    pub fn alert_level(self) -> AlertLevel {
        match self {
            Self::Blackout | Self::Critical => AlertLevel::Critical,
            Self::Poor | Self::BelowBaseline => AlertLevel::Warning,
            Self::Healthy => AlertLevel::Ok,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Blackout => "Blackout",
            Self::Critical => "Critical",
            Self::Poor => "Poor",
            Self::BelowBaseline => "Below Baseline",
            Self::Healthy => "Healthy",
        }
    }
}

impl fmt::Display for StakingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Day-over-day change in percentage points.
pub fn day_over_day_delta(latest: &StakingRecord, previous: Option<&StakingRecord>) -> Option<f64> {
    previous.map(|prev| latest.rate - prev.rate)
}

/// Staking sub-score relative to the baseline, capped at 100.
pub fn staking_score(rate: f64, baseline: f64) -> u32 {
    if rate <= 0.0 {
        return 0;
    }
    let score = (rate / baseline * 100.0).round().min(100.0);
    score as u32
}
