use chrono::{DateTime, Utc};

use crate::alerts::build_alerts;
use crate::config::EvaluatorConfig;
use crate::health::{composite_score, grade, metric_scores};
use crate::models::{HealthReport, Snapshot};
use crate::staking::{day_over_day_delta, StakingStatus};

/// Derive the full health view from one snapshot. Pure; call again whenever
/// the underlying records change.
pub fn evaluate(snapshot: &Snapshot, config: &EvaluatorConfig, now: DateTime<Utc>) -> HealthReport {
    let metrics = metric_scores(snapshot, config);
    let health_score = composite_score(&metrics, config);
    let grade = grade(health_score);
    let latest = snapshot.latest();

    tracing::debug!(
        records = snapshot.records.len(),
        memories = snapshot.memories.len(),
        health_score,
        "evaluated staking health"
    );

    HealthReport {
        alerts: build_alerts(snapshot, config, now),
        health_score,
        grade: grade.letter.to_string(),
        grade_label: grade.label.to_string(),
        status: latest.map(|record| StakingStatus::classify(record.rate, config)),
        delta: latest.and_then(|record| day_over_day_delta(record, snapshot.previous())),
        metrics,
    }
}
