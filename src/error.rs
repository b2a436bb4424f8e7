use std::process::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("metric weights must sum to 100, got {0}")]
    WeightSum(u64),

    #[error("thresholds must satisfy 0 < critical ({critical}) <= poor ({poor}) <= healthy ({healthy})")]
    Bands { critical: f64, poor: f64, healthy: f64 },

    #[error("baseline must be a positive number, got {0}")]
    Baseline(f64),

    #[error("sharp_move_pp must be a positive number, got {0}")]
    SharpMove(f64),

    #[error("placeholder score for {name} must be at most 100, got {score}")]
    Placeholder { name: &'static str, score: u32 },
}

/// Problems with a single raw staking row. These never abort an evaluation;
/// the row is dropped and the reason logged.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unparsable date {0:?}")]
    Date(String),

    #[error("negative completion rate {0}")]
    NegativeRate(f64),

    #[error("completion rate is not a finite number")]
    NonFiniteRate,
}

impl ConfigError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(2)
    }
}
