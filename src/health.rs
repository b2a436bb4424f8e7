//! Composite health score and letter grade.

use std::collections::BTreeMap;

use crate::config::EvaluatorConfig;
use crate::models::{MetricScore, Snapshot};
use crate::staking::{day_over_day_delta, staking_score};

/// Staking sub-score when there is nothing to score.
const NO_DATA_SCORE: u32 = 50;
const PLACEHOLDER_NOTE: &str = "Pending live data feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub letter: &'static str,
    pub label: &'static str,
}

pub fn grade(score: u32) -> Grade {
    let (letter, label) = match score {
        90.. => ("A", "Excellent"),
        75..=89 => ("B", "Good"),
        60..=74 => ("C", "Fair"),
        40..=59 => ("D", "Warning"),
        _ => ("F", "Critical"),
    };
    Grade { letter, label }
}

/// Per-metric sub-scores keyed by metric name.
pub fn metric_scores(snapshot: &Snapshot, config: &EvaluatorConfig) -> BTreeMap<String, MetricScore> {
    let mut metrics = BTreeMap::new();

    let staking = match snapshot.latest() {
        Some(latest) => MetricScore {
            score: staking_score(latest.rate, config.baseline),
            value: Some(latest.rate),
            delta: day_over_day_delta(latest, snapshot.previous()),
            note: Some(format!(
                "{}/{} completions on {}",
                latest.completions, latest.starts, latest.date
            )),
            is_live: true,
        },
        None => MetricScore {
            score: NO_DATA_SCORE,
            value: None,
            delta: None,
            note: Some("No staking data".to_string()),
            is_live: false,
        },
    };
    metrics.insert("staking".to_string(), staking);

    for (name, score) in [
        ("dau", config.placeholders.dau),
        ("retention", config.placeholders.retention),
        ("engagement", config.placeholders.engagement),
    ] {
        metrics.insert(
            name.to_string(),
            MetricScore {
                score,
                value: None,
                delta: None,
                note: Some(PLACEHOLDER_NOTE.to_string()),
                is_live: false,
            },
        );
    }

    metrics
}

/// Weighted blend of the sub-scores, rounded to a whole number.
///
/// Products are summed as integers and divided once, so a blend landing on
/// exactly `.5` rounds up.
pub fn composite_score(metrics: &BTreeMap<String, MetricScore>, config: &EvaluatorConfig) -> u32 {
    let weights = config.weights;
    let weighted: u64 = [
        ("staking", weights.staking),
        ("dau", weights.dau),
        ("retention", weights.retention),
        ("engagement", weights.engagement),
    ]
    .into_iter()
    .filter_map(|(name, weight)| {
        metrics
            .get(name)
            .map(|metric| u64::from(metric.score) * u64::from(weight))
    })
    .fold(0, u64::saturating_add);

    (weighted as f64 / 100.0).round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StakingRecord;
    use chrono::NaiveDate;

    fn record(date: &str, starts: u32, completions: u32, rate: f64) -> StakingRecord {
        StakingRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            starts,
            completions,
            rate,
            source: None,
            notes: None,
            created_at: None,
        }
    }

    #[test]
    fn grade_boundaries_are_inclusive_below() {
        assert_eq!(grade(100).letter, "A");
        assert_eq!(grade(90).letter, "A");
        assert_eq!(grade(89).letter, "B");
        assert_eq!(grade(75).letter, "B");
        assert_eq!(grade(74).letter, "C");
        assert_eq!(grade(60).letter, "C");
        assert_eq!(grade(59).letter, "D");
        assert_eq!(grade(40).letter, "D");
        assert_eq!(grade(39).letter, "F");
        assert_eq!(grade(0).label, "Critical");
    }

    #[test]
    fn baseline_day_scores_full_marks() {
        let config = EvaluatorConfig::default();
        let snapshot = Snapshot {
            records: vec![record("2026-02-19", 500, 170, 34.0)],
            memories: Vec::new(),
        };
        let metrics = metric_scores(&snapshot, &config);
        let staking = &metrics["staking"];
        assert_eq!(staking.score, 100);
        assert_eq!(staking.delta, None);
        assert!(staking.is_live);
        assert_eq!(staking.note.as_deref(), Some("170/500 completions on 2026-02-19"));

        // 100*40 + 70*25 + 68*20 + 74*15 = 8220
        assert_eq!(composite_score(&metrics, &config), 82);
        assert_eq!(grade(82).letter, "B");
    }

    #[test]
    fn blackout_zeroes_staking() {
        let config = EvaluatorConfig::default();
        let snapshot = Snapshot {
            records: vec![
                record("2026-02-19", 500, 170, 34.0),
                record("2026-02-20", 300, 0, 0.0),
            ],
            memories: Vec::new(),
        };
        let metrics = metric_scores(&snapshot, &config);
        assert_eq!(metrics["staking"].score, 0);
        assert_eq!(metrics["staking"].delta, Some(-34.0));
        // 0 + 17.5 + 13.6 + 11.1 = 42.2
        assert_eq!(composite_score(&metrics, &config), 42);
    }

    #[test]
    fn no_data_uses_neutral_staking_score() {
        let config = EvaluatorConfig::default();
        let metrics = metric_scores(&Snapshot::default(), &config);
        assert_eq!(metrics["staking"].score, 50);
        assert!(!metrics["staking"].is_live);
        // 20 + 17.5 + 13.6 + 11.1 = 62.2
        assert_eq!(composite_score(&metrics, &config), 62);
    }

    #[test]
    fn half_point_blend_rounds_up() {
        let config = EvaluatorConfig::default();
        let mut metrics = metric_scores(&Snapshot::default(), &config);
        for (name, score) in [("staking", 1), ("dau", 3), ("retention", 82), ("engagement", 33)] {
            metrics.get_mut(name).unwrap().score = score;
        }
        // 0.4 + 0.75 + 16.4 + 4.95 = 22.5
        assert_eq!(composite_score(&metrics, &config), 23);
    }

    #[test]
    fn placeholders_come_from_config() {
        let mut config = EvaluatorConfig::default();
        config.placeholders.dau = 90;
        let metrics = metric_scores(&Snapshot::default(), &config);
        assert_eq!(metrics["dau"].score, 90);
        assert_eq!(metrics["dau"].note.as_deref(), Some(PLACEHOLDER_NOTE));
        assert_eq!(metrics.len(), 4);
    }
}
