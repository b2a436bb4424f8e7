use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::config::EvaluatorConfig;
use crate::models::{DayStatus, HealthReport, HistorySummary, Snapshot};
use crate::staking::StakingStatus;

pub fn summarize_history(snapshot: &Snapshot, config: &EvaluatorConfig) -> HistorySummary {
    let records = &snapshot.records;
    let days = records.len();

    let average_rate = if days == 0 {
        0.0
    } else {
        records.iter().map(|r| r.rate).sum::<f64>() / days as f64
    };

    let best = records
        .iter()
        .max_by(|a, b| a.rate.total_cmp(&b.rate))
        .map(|r| (r.date, r.rate));
    let worst = records
        .iter()
        .min_by(|a, b| a.rate.total_cmp(&b.rate))
        .map(|r| (r.date, r.rate));

    let mut timeline: Vec<DayStatus> = records
        .iter()
        .enumerate()
        .map(|(i, record)| DayStatus {
            date: record.date,
            rate: record.rate,
            starts: record.starts,
            completions: record.completions,
            status: StakingStatus::classify(record.rate, config),
            delta: i.checked_sub(1).map(|prev| record.rate - records[prev].rate),
        })
        .collect();
    timeline.reverse();

    HistorySummary {
        days,
        average_rate,
        best,
        worst,
        blackout_days: timeline
            .iter()
            .filter(|day| day.status == StakingStatus::Blackout)
            .count(),
        healthy_days: timeline
            .iter()
            .filter(|day| day.status == StakingStatus::Healthy)
            .count(),
        timeline,
    }
}

/// Plain-text rendering for the terminal.
pub fn render_text(report: &HealthReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "Health score {} ({} - {})",
        report.health_score, report.grade, report.grade_label
    );
    if let Some(status) = report.status {
        let _ = write!(output, "Staking status: {status}");
        match report.delta {
            Some(delta) => {
                let _ = writeln!(output, " ({delta:+.1}pp day-over-day)");
            }
            None => {
                let _ = writeln!(output);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "Alerts:");
    for alert in &report.alerts {
        let _ = writeln!(output, "- [{}] {}: {}", alert.level, alert.title, alert.description);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "Metrics:");
    for (name, metric) in &report.metrics {
        let _ = write!(output, "- {name}: {}", metric.score);
        if let Some(note) = &metric.note {
            let _ = write!(output, " ({note})");
        }
        let _ = writeln!(output);
    }

    output
}

pub fn build_report(
    snapshot: &Snapshot,
    report: &HealthReport,
    config: &EvaluatorConfig,
    generated_at: DateTime<Utc>,
) -> String {
    let history = summarize_history(snapshot, config);

    let mut output = String::new();

    let _ = writeln!(output, "# Staking Health Report");
    let _ = writeln!(
        output,
        "Generated {} over {} days of staking data",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        history.days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Health Score");
    let _ = writeln!(
        output,
        "**{} / 100** (grade {}, {})",
        report.health_score, report.grade, report.grade_label
    );
    let _ = writeln!(output);

    let weights = config.weights;
    for (name, weight) in [
        ("staking", weights.staking),
        ("dau", weights.dau),
        ("retention", weights.retention),
        ("engagement", weights.engagement),
    ] {
        if let Some(metric) = report.metrics.get(name) {
            let source = if metric.is_live { "live" } else { "estimated" };
            let _ = writeln!(
                output,
                "- {}: {} x {}% ({})",
                name, metric.score, weight, source
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts");

    for alert in &report.alerts {
        let _ = write!(output, "- **{}** {}: {}", alert.level, alert.title, alert.description);
        if let (Some(metric), Some(value)) = (&alert.metric, &alert.value) {
            let _ = write!(output, " [{metric}: {value}");
            if let Some(threshold) = &alert.threshold {
                let _ = write!(output, ", {threshold}");
            }
            let _ = write!(output, "]");
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Staking History");

    if history.timeline.is_empty() {
        let _ = writeln!(output, "No staking metrics recorded for this window.");
        return output;
    }

    let _ = writeln!(output, "- Average completion: {:.1}%", history.average_rate);
    if let (Some((best_date, best_rate)), Some((worst_date, worst_rate))) = (history.best, history.worst) {
        let _ = writeln!(output, "- Best day: {best_date} at {best_rate:.1}%");
        let _ = writeln!(output, "- Worst day: {worst_date} at {worst_rate:.1}%");
    }
    let _ = writeln!(
        output,
        "- Days at baseline: {} of {}",
        history.healthy_days, history.days
    );
    let _ = writeln!(output, "- Blackout days: {}", history.blackout_days);
    let _ = writeln!(output);

    let _ = writeln!(output, "| Date | Completions | Rate | Change | Status |");
    let _ = writeln!(output, "|------|-------------|------|--------|--------|");
    for day in &history.timeline {
        let change = day
            .delta
            .map(|delta| format!("{delta:+.1}pp"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            output,
            "| {} | {}/{} | {:.1}% | {} | {} |",
            day.date, day.completions, day.starts, day.rate, change, day.status
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;
    use crate::models::StakingRecord;
    use chrono::{NaiveDate, TimeZone};

    fn record(day: u32, starts: u32, completions: u32, rate: f64) -> StakingRecord {
        StakingRecord {
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            starts,
            completions,
            rate,
            source: None,
            notes: None,
            created_at: None,
        }
    }

    fn sample() -> Snapshot {
        Snapshot {
            records: vec![
                record(16, 500, 175, 35.0),
                record(17, 400, 0, 0.0),
                record(18, 400, 100, 25.0),
            ],
            memories: Vec::new(),
        }
    }

    #[test]
    fn history_counts_days_by_status() {
        let summary = summarize_history(&sample(), &EvaluatorConfig::default());
        assert_eq!(summary.days, 3);
        assert!((summary.average_rate - 20.0).abs() < 1e-9);
        assert_eq!(summary.best.map(|(_, rate)| rate), Some(35.0));
        assert_eq!(summary.worst.map(|(d, _)| d.to_string()), Some("2026-02-17".to_string()));
        assert_eq!(summary.blackout_days, 1);
        assert_eq!(summary.healthy_days, 1);
    }

    #[test]
    fn timeline_is_newest_first_with_deltas() {
        let summary = summarize_history(&sample(), &EvaluatorConfig::default());
        assert_eq!(summary.timeline[0].date.to_string(), "2026-02-18");
        assert_eq!(summary.timeline[0].delta, Some(25.0));
        assert_eq!(summary.timeline[0].status, StakingStatus::BelowBaseline);
        assert_eq!(summary.timeline[2].delta, None);
    }

    #[test]
    fn markdown_report_has_all_sections() {
        let config = EvaluatorConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 8, 0, 0).unwrap();
        let snapshot = sample();
        let health = evaluate(&snapshot, &config, now);
        let report = build_report(&snapshot, &health, &config, now);

        assert!(report.starts_with("# Staking Health Report"));
        assert!(report.contains("## Health Score"));
        assert!(report.contains("## Alerts"));
        assert!(report.contains("Strong Staking Recovery"));
        assert!(report.contains("| 2026-02-17 | 0/400 | 0.0% | -35.0pp | Blackout |"));
        assert!(report.contains("- staking: 73 x 40% (live)"));
        assert!(report.contains("- dau: 70 x 25% (estimated)"));
    }

    #[test]
    fn empty_window_is_reported() {
        let config = EvaluatorConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 8, 0, 0).unwrap();
        let snapshot = Snapshot::default();
        let health = evaluate(&snapshot, &config, now);
        let report = build_report(&snapshot, &health, &config, now);
        assert!(report.contains("No Staking Data"));
        assert!(report.contains("No staking metrics recorded for this window."));
    }

    #[test]
    fn text_rendering_lists_alerts_and_metrics() {
        let config = EvaluatorConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 8, 0, 0).unwrap();
        let health = evaluate(&sample(), &config, now);
        let text = render_text(&health);
        assert!(text.contains("Staking status: Below Baseline (+25.0pp day-over-day)"));
        assert!(text.contains("- [WARNING] Staking Below Baseline"));
        assert!(text.contains("- retention: 68"));
    }
}
