//! Tolerant decoding of raw staking rows and memory entries.
//!
//! Historical data mixes fractional and percentage completion rates and
//! contains the occasional corrupt row. Rows that cannot be decoded are
//! dropped with a warning instead of failing the whole snapshot.

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordError;
use crate::models::{MemoryEntry, Snapshot, StakingRecord};
use crate::staking::{normalize_rate, rate_from_counts};

/// Memory type whose content is a JSON-encoded staking row.
pub const STAKING_MEMORY_KIND: &str = "staking-metric";

/// Staking row as posted by the reporting collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStakingRecord {
    pub date: String,
    pub starts: u32,
    pub completions: u32,
    #[serde(default, alias = "completion_rate", skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default,
        alias = "created_at",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl RawStakingRecord {
    pub fn into_record(self) -> Result<StakingRecord, RecordError> {
        let date = parse_date(&self.date)?;
        let rate = match self.completion_rate {
            Some(raw) if !raw.is_finite() => return Err(RecordError::NonFiniteRate),
            Some(raw) if raw < 0.0 => return Err(RecordError::NegativeRate(raw)),
            Some(_) if self.starts == 0 => 0.0,
            Some(raw) => normalize_rate(raw),
            None => rate_from_counts(self.starts, self.completions),
        };

        Ok(StakingRecord {
            date,
            starts: self.starts,
            completions: self.completions,
            rate,
            source: self.source,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

/// Parse `YYYY-MM-DD`, ignoring any time suffix.
pub fn parse_date(value: &str) -> Result<NaiveDate, RecordError> {
    let trimmed = value.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| RecordError::Date(value.to_string()))
}

pub fn decode_record(value: Value) -> Result<StakingRecord, RecordError> {
    let raw: RawStakingRecord = serde_json::from_value(value)?;
    raw.into_record()
}

pub fn decode_records<I>(values: I) -> Vec<StakingRecord>
where
    I: IntoIterator<Item = Value>,
{
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match decode_record(value) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping malformed staking record");
                None
            }
        })
        .collect()
}

pub fn decode_memories<I>(values: I) -> Vec<MemoryEntry>
where
    I: IntoIterator<Item = Value>,
{
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<MemoryEntry>(value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping malformed memory entry");
                None
            }
        })
        .collect()
}

/// Staking rows logged into the memory feed as JSON content.
pub fn records_from_memories(memories: &[MemoryEntry]) -> Vec<StakingRecord> {
    memories
        .iter()
        .filter(|memory| memory.kind == STAKING_MEMORY_KIND)
        .filter_map(|memory| {
            let decoded = serde_json::from_str::<RawStakingRecord>(&memory.content)
                .map_err(RecordError::from)
                .and_then(|raw| raw.into_record());
            match decoded {
                Ok(mut record) => {
                    if record.created_at.is_none() {
                        record.created_at = Some(memory.timestamp);
                    }
                    Some(record)
                }
                Err(err) => {
                    tracing::warn!(memory = %memory.id, error = %err, "skipping malformed staking memory");
                    None
                }
            }
        })
        .collect()
}

/// Staking rows from CSV that would survive a later read. Anything the
/// evaluator would drop is skipped here so an upsert never replaces a good
/// day with an unreadable one.
pub fn csv_rows<R: Read>(reader: R) -> Vec<RawStakingRecord> {
    let mut reader = csv::Reader::from_reader(reader);

    reader
        .deserialize::<RawStakingRecord>()
        .enumerate()
        .filter_map(|(index, result)| {
            let line = index + 2;
            let row = match result {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!(line, error = %err, "skipping malformed CSV row");
                    return None;
                }
            };
            match row.clone().into_record() {
                Ok(_) => Some(row),
                Err(err) => {
                    tracing::warn!(line, error = %err, "skipping malformed CSV row");
                    None
                }
            }
        })
        .collect()
}

/// Order records by date, keeping the last record seen for each date.
pub fn build_series<I>(records: I) -> Vec<StakingRecord>
where
    I: IntoIterator<Item = StakingRecord>,
{
    let mut by_date: BTreeMap<NaiveDate, StakingRecord> = BTreeMap::new();
    for record in records {
        by_date.insert(record.date, record);
    }
    by_date.into_values().collect()
}

/// Snapshot file layout accepted by `--input`.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotInput {
    #[serde(default)]
    pub records: Vec<Value>,
    #[serde(default)]
    pub memories: Vec<Value>,
}

impl SnapshotInput {
    pub fn into_snapshot(self) -> Snapshot {
        let memories = decode_memories(self.memories);
        let mut records = records_from_memories(&memories);
        records.extend(decode_records(self.records));
        Snapshot {
            records: build_series(records),
            memories,
        }
    }
}

pub fn read_snapshot<R: Read>(reader: R) -> anyhow::Result<Snapshot> {
    let input: SnapshotInput =
        serde_json::from_reader(reader).context("snapshot is not a JSON object with records/memories")?;
    Ok(input.into_snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_fractional_and_percentage_rates() {
        let records = decode_records(vec![
            json!({"date": "2026-02-19", "starts": 500, "completions": 170, "completionRate": 0.34}),
            json!({"date": "2026-02-20", "starts": 400, "completions": 100, "completionRate": 25.0}),
        ]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rate, 34.0);
        assert_eq!(records[1].rate, 25.0);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let records = decode_records(vec![
            json!({"date": "2026-02-19", "starts": 500, "completions": 170, "completionRate": 0.34}),
            json!({"date": "yesterday", "starts": 1, "completions": 1, "completionRate": 1.0}),
            json!({"date": "2026-02-20", "starts": -4, "completions": 0}),
            json!({"date": "2026-02-21", "starts": 10, "completions": 2, "completionRate": -0.2}),
            json!("not even an object"),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date.to_string(), "2026-02-19");
    }

    #[test]
    fn zero_starts_reports_blackout_rate() {
        let record = decode_record(json!({"date": "2026-02-19", "starts": 0, "completions": 0})).unwrap();
        assert_eq!(record.rate, 0.0);

        let record = decode_record(
            json!({"date": "2026-02-19", "starts": 0, "completions": 0, "completionRate": 0.4}),
        )
        .unwrap();
        assert_eq!(record.rate, 0.0);
    }

    #[test]
    fn missing_rate_is_derived_from_counts() {
        let record = decode_record(json!({"date": "2026-02-19", "starts": 200, "completions": 50})).unwrap();
        assert_eq!(record.rate, 25.0);
    }

    #[test]
    fn csv_rows_use_snake_case_headers() {
        let data = "date,starts,completions,completion_rate,source,notes\n\
                    2026-02-17,495,124,0.2505,mixpanel,\n";
        let rows = csv_rows(data.as_bytes());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].completion_rate, Some(0.2505));
        assert_eq!(rows[0].notes, None);

        let record = rows[0].clone().into_record().unwrap();
        assert!((record.rate - 25.05).abs() < 1e-9);
    }

    #[test]
    fn csv_rows_drop_what_the_read_path_would_drop() {
        let data = "date,starts,completions,completion_rate,source,notes\n\
                    2026-02-18,500,170,0.34,,\n\
                    2026-02-19,500,170,-0.2,,\n\
                    2026-02-20,500,170,NaN,,\n\
                    19/02/2026,500,170,0.34,,\n\
                    2026-02-21,-5,0,0.1,,\n\
                    2026-02-22,400,100,,,\n";
        let rows = csv_rows(data.as_bytes());
        let dates: Vec<&str> = rows.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-02-18", "2026-02-22"]);
    }

    #[test]
    fn date_accepts_timestamp_suffix() {
        assert_eq!(
            parse_date("2026-02-19T08:00:00Z").unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 19).unwrap()
        );
        assert!(parse_date("02/19/2026").is_err());
    }

    #[test]
    fn series_is_ascending_and_last_write_wins() {
        let records = decode_records(vec![
            json!({"date": "2026-02-21", "starts": 100, "completions": 30, "completionRate": 0.3}),
            json!({"date": "2026-02-19", "starts": 100, "completions": 20, "completionRate": 0.2}),
            json!({"date": "2026-02-21", "starts": 100, "completions": 40, "completionRate": 0.4}),
        ]);
        let series = build_series(records);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date.to_string(), "2026-02-19");
        assert_eq!(series[1].completions, 40);
    }

    #[test]
    fn staking_memories_feed_the_series() {
        let memories = decode_memories(vec![
            json!({
                "id": "m1",
                "timestamp": 1771488000000_i64,
                "type": STAKING_MEMORY_KIND,
                "content": "{\"date\":\"2026-02-19\",\"starts\":500,\"completions\":170,\"completionRate\":0.34}",
                "agent": "INSIGHT"
            }),
            json!({
                "id": "m2",
                "timestamp": 1771488000000_i64,
                "type": STAKING_MEMORY_KIND,
                "content": "{broken"
            }),
            json!({
                "id": "m3",
                "timestamp": 1771488000000_i64,
                "type": "note",
                "content": "unrelated"
            }),
            json!({"id": "m4"}),
        ]);
        assert_eq!(memories.len(), 3);

        let records = records_from_memories(&memories);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rate, 34.0);
        assert_eq!(records[0].created_at, Some(memories[0].timestamp));
    }

    #[test]
    fn snapshot_reads_both_sections() {
        let body = r#"{
            "records": [
                {"date": "2026-02-20", "starts": 100, "completions": 5, "completionRate": 0.05},
                {"date": "bad"}
            ],
            "memories": [
                {"id": "m1", "timestamp": 1771488000000, "type": "staking-metric",
                 "content": "{\"date\":\"2026-02-19\",\"starts\":100,\"completions\":25,\"completionRate\":0.25}"}
            ]
        }"#;
        let snapshot = read_snapshot(body.as_bytes()).unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.latest().unwrap().rate, 5.0);
        assert_eq!(snapshot.previous().unwrap().rate, 25.0);
        assert_eq!(snapshot.memories.len(), 1);
    }

    #[test]
    fn snapshot_must_be_an_object() {
        assert!(read_snapshot("[1, 2]".as_bytes()).is_err());
        let empty = read_snapshot("{}".as_bytes()).unwrap();
        assert!(empty.records.is_empty());
    }
}
