use chrono::{DateTime, Utc};

use crate::config::EvaluatorConfig;
use crate::models::{Alert, AlertLevel, Importance, MemoryEntry, Snapshot, StakingRecord};
use crate::staking::{day_over_day_delta, StakingStatus};

const MEMORY_PREVIEW_CHARS: usize = 200;

/// Every alert for the snapshot, most severe first.
pub fn build_alerts(snapshot: &Snapshot, config: &EvaluatorConfig, now: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = match snapshot.latest() {
        Some(latest) => staking_alerts(latest, snapshot.previous(), config, now),
        None => Vec::new(),
    };

    alerts.extend(memory_alerts(&snapshot.memories, config.max_memory_alerts));

    if snapshot.records.is_empty() {
        alerts.push(no_data_alert(now));
    }

    sort_alerts(&mut alerts);
    alerts
}

/// Stable sort by level; alerts of the same level keep insertion order.
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by_key(|alert| alert.level.rank());
}

pub fn staking_alerts(
    latest: &StakingRecord,
    previous: Option<&StakingRecord>,
    config: &EvaluatorConfig,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let timestamp = latest.created_at.unwrap_or(now);
    let agent = Some(config.reporting_agent.clone());
    let mut alerts = vec![baseline_alert(latest, config, timestamp)];

    if let (Some(prev), Some(delta)) = (previous, day_over_day_delta(latest, previous)) {
        let movement = format!(
            "{}: {:.1}% -> {}: {:.1}%",
            prev.date, prev.rate, latest.date, latest.rate
        );

        if delta <= -config.sharp_move_pp {
            alerts.push(Alert {
                id: "staking-drop".to_string(),
                level: AlertLevel::Critical,
                title: "Sharp Staking Drop".to_string(),
                description: format!(
                    "Staking dropped {:.1}pp in one day ({movement}).",
                    delta.abs()
                ),
                metric: Some("Day-over-Day Delta".to_string()),
                value: Some(format!("{delta:.1}pp")),
                threshold: Some(format!("-{}pp trigger", config.sharp_move_pp)),
                timestamp,
                related_agent: agent.clone(),
            });
        } else if delta >= config.sharp_move_pp {
            alerts.push(Alert {
                id: "staking-jump".to_string(),
                level: AlertLevel::Info,
                title: "Strong Staking Recovery".to_string(),
                description: format!("Staking jumped +{delta:.1}pp day-over-day ({movement})."),
                metric: Some("Day-over-Day Delta".to_string()),
                value: Some(format!("+{delta:.1}pp")),
                threshold: Some(format!("+{}pp trigger", config.sharp_move_pp)),
                timestamp,
                related_agent: agent.clone(),
            });
        }
    }

    if latest.rate == 0.0 {
        // A zero-starts day may still carry a completions count; the rate is what failed.
        let description = if latest.starts == 0 {
            "No staking starts recorded. Staking functionality may be non-operational."
        } else {
            "Zero completions recorded. Staking functionality may be non-operational."
        };
        alerts.push(Alert {
            id: "staking-blackout".to_string(),
            level: AlertLevel::Critical,
            title: "Staking Blackout Detected".to_string(),
            description: description.to_string(),
            metric: Some("Completion Rate".to_string()),
            value: Some(format!("{:.1}%", latest.rate)),
            threshold: Some("> 0% required".to_string()),
            timestamp,
            related_agent: agent,
        });
    }

    alerts
}

fn baseline_alert(latest: &StakingRecord, config: &EvaluatorConfig, timestamp: DateTime<Utc>) -> Alert {
    let rate = latest.rate;
    let status = StakingStatus::classify(rate, config);
    let level = status.alert_level();
    let baseline = config.healthy_threshold;

    let (title, description) = match level {
        AlertLevel::Ok => (
            "Staking At Baseline",
            format!("{rate:.1}% completion, at or above the {baseline}% baseline. Platform healthy."),
        ),
        AlertLevel::Warning => (
            "Staking Below Baseline",
            format!(
                "{rate:.1}% completion, {:.1}pp below the {baseline}% baseline. Needs monitoring.",
                baseline - rate
            ),
        ),
        AlertLevel::Critical | AlertLevel::Info => (
            "Staking Critical",
            format!("{rate:.1}% completion, severe degradation. Immediate investigation required."),
        ),
    };

    Alert {
        id: "staking-current".to_string(),
        level,
        title: title.to_string(),
        description,
        metric: Some("Staking Completion".to_string()),
        value: Some(format!("{rate:.1}%")),
        threshold: Some(format!("{baseline}% baseline")),
        timestamp,
        related_agent: Some(config.reporting_agent.clone()),
    }
}

/// Pass-through alerts for memories flagged high or critical, newest first.
pub fn memory_alerts(memories: &[MemoryEntry], limit: usize) -> Vec<Alert> {
    let mut flagged: Vec<(&MemoryEntry, AlertLevel)> = memories
        .iter()
        .filter_map(|memory| match memory.importance() {
            Some(Importance::Critical) => Some((memory, AlertLevel::Critical)),
            Some(Importance::High) => Some((memory, AlertLevel::Warning)),
            _ => None,
        })
        .collect();
    flagged.sort_by(|a, b| b.0.timestamp.cmp(&a.0.timestamp));

    flagged
        .into_iter()
        .take(limit)
        .map(|(memory, level)| Alert {
            id: format!("memory-{}", memory.id),
            level,
            title: "High-Priority Memory Flagged".to_string(),
            description: preview(&memory.content),
            metric: None,
            value: None,
            threshold: None,
            timestamp: memory.timestamp,
            related_agent: memory.agent.clone(),
        })
        .collect()
}

pub fn no_data_alert(now: DateTime<Utc>) -> Alert {
    Alert {
        id: "no-staking-data".to_string(),
        level: AlertLevel::Info,
        title: "No Staking Data".to_string(),
        description: "No staking metrics have been logged yet. The reporting agent should post daily staking data."
            .to_string(),
        metric: None,
        value: None,
        threshold: None,
        timestamp: now,
        related_agent: None,
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(MEMORY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
