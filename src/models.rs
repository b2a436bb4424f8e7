use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::staking::StakingStatus;

/// One day of staking funnel data with the completion rate already
/// normalized to the 0-100 percentage scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingRecord {
    pub date: NaiveDate,
    pub starts: u32,
    pub completions: u32,
    pub rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Importance {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
}

/// Entry from the agents' memory log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MemoryMetadata>,
}

impl MemoryEntry {
    pub fn importance(&self) -> Option<Importance> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.importance.as_deref())
            .and_then(Importance::parse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Critical,
    Warning,
    Info,
    Ok,
}

impl AlertLevel {
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Warning => 1,
            Self::Info => 2,
            Self::Ok => 3,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Ok => "OK",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricScore {
    pub score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub is_live: bool,
}

/// Output of one evaluation, shaped for any rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub alerts: Vec<Alert>,
    pub health_score: u32,
    pub grade: String,
    pub grade_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StakingStatus>,
    pub delta: Option<f64>,
    pub metrics: BTreeMap<String, MetricScore>,
}

/// Everything the evaluator looks at in one pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Ascending by date, one record per date.
    pub records: Vec<StakingRecord>,
    pub memories: Vec<MemoryEntry>,
}

impl Snapshot {
    pub fn latest(&self) -> Option<&StakingRecord> {
        self.records.last()
    }

    pub fn previous(&self) -> Option<&StakingRecord> {
        self.records.iter().rev().nth(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub rate: f64,
    pub starts: u32,
    pub completions: u32,
    pub status: StakingStatus,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub days: usize,
    pub average_rate: f64,
    pub best: Option<(NaiveDate, f64)>,
    pub worst: Option<(NaiveDate, f64)>,
    pub blackout_days: usize,
    pub healthy_days: usize,
    /// Newest first.
    pub timeline: Vec<DayStatus>,
}
