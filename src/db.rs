use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ingest::{self, build_series, RawStakingRecord};
use crate::models::{Importance, MemoryEntry, MemoryMetadata, Snapshot, StakingRecord};

pub const DEFAULT_STAKING_LIMIT: i64 = 30;
pub const DEFAULT_MEMORY_LIMIT: i64 = 100;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Memory row to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub kind: String,
    pub content: String,
    pub agent: Option<String>,
    pub importance: Option<Importance>,
    pub tags: Vec<String>,
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    // Mixes fractional and percentage rates, as the reporting feed does.
    let days = vec![
        ("2026-02-15", 480, 168, 0.35, None),
        ("2026-02-16", 510, 173, 33.9, None),
        ("2026-02-17", 495, 124, 0.2505, Some("App release 4.12 rolled out")),
        ("2026-02-18", 0, 0, 0.0, Some("Mixpanel export empty")),
        ("2026-02-19", 500, 170, 0.34, Some("Baseline day")),
    ];

    for (date, starts, completions, completion_rate, notes) in days {
        upsert_staking(
            pool,
            &RawStakingRecord {
                date: date.to_string(),
                starts,
                completions,
                completion_rate: Some(completion_rate),
                source: Some("seed".to_string()),
                notes: notes.map(str::to_string),
                created_at: None,
            },
        )
        .await?;
    }

    let memories = vec![
        NewMemory {
            kind: "decision".to_string(),
            content: "Paused the staking push campaign until the wallet SDK fix ships.".to_string(),
            agent: Some("APEX".to_string()),
            importance: Some(Importance::High),
            tags: vec!["staking".to_string()],
        },
        NewMemory {
            kind: "conversation".to_string(),
            content: "Weekly sync notes: thumbnails for the staking explainer are in review.".to_string(),
            agent: Some("VIBE".to_string()),
            importance: Some(Importance::Low),
            tags: Vec::new(),
        },
    ];

    for memory in memories {
        add_memory(pool, &memory).await?;
    }

    Ok(())
}

/// Insert or replace the row for `record.date`. Returns the row id, which is
/// stable across resubmissions of the same date.
pub async fn upsert_staking(pool: &PgPool, record: &RawStakingRecord) -> anyhow::Result<Uuid> {
    let date = ingest::parse_date(&record.date)?;
    let source = record.source.clone().unwrap_or_else(|| "mixpanel".to_string());

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO mission_control.staking_metrics
        (id, date, starts, completions, completion_rate, source, notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, now()))
        ON CONFLICT (date) DO UPDATE
        SET starts = EXCLUDED.starts,
            completions = EXCLUDED.completions,
            completion_rate = EXCLUDED.completion_rate,
            source = EXCLUDED.source,
            notes = EXCLUDED.notes
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(date)
    .bind(i64::from(record.starts))
    .bind(i64::from(record.completions))
    .bind(record.completion_rate)
    .bind(source)
    .bind(&record.notes)
    .bind(record.created_at)
    .fetch_one(pool)
    .await
    .with_context(|| format!("upserting staking metrics for {date}"))?
    .try_get("id")?;

    tracing::info!(%date, %id, "upserted staking metrics");
    Ok(id)
}

/// Upsert every row of a staking CSV. Rows that fail to parse are skipped.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("opening {}", csv_path.display()))?;
    let rows = ingest::csv_rows(file);

    for row in &rows {
        upsert_staking(pool, row).await?;
    }

    Ok(rows.len())
}

/// Latest `limit` days, returned ascending by date.
pub async fn fetch_recent_staking(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<StakingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT date, starts, completions, completion_rate, source, notes, created_at
        FROM mission_control.staking_metrics
        ORDER BY date DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let date: NaiveDate = row.try_get("date")?;
        let starts: i64 = row.try_get("starts")?;
        let completions: i64 = row.try_get("completions")?;

        let (Ok(starts), Ok(completions)) = (u32::try_from(starts), u32::try_from(completions)) else {
            tracing::warn!(%date, starts, completions, "skipping staking row with out-of-range counts");
            continue;
        };

        let raw = RawStakingRecord {
            date: date.to_string(),
            starts,
            completions,
            completion_rate: row.try_get("completion_rate")?,
            source: row.try_get("source")?,
            notes: row.try_get("notes")?,
            created_at: Some(row.try_get::<DateTime<Utc>, _>("created_at")?),
        };

        match raw.into_record() {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(%date, error = %err, "skipping malformed staking row"),
        }
    }

    Ok(build_series(records))
}

pub async fn add_memory(pool: &PgPool, memory: &NewMemory) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO mission_control.memories
        (id, recorded_at, kind, content, agent, importance, tags)
        VALUES ($1, now(), $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(&memory.kind)
    .bind(&memory.content)
    .bind(&memory.agent)
    .bind(memory.importance.map(Importance::as_str))
    .bind(&memory.tags)
    .execute(pool)
    .await
    .context("inserting memory")?;

    Ok(id)
}

/// Newest first.
pub async fn fetch_recent_memories(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<MemoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, recorded_at, kind, content, agent, importance, tags
        FROM mission_control.memories
        ORDER BY recorded_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut memories = Vec::with_capacity(rows.len());

    for row in rows {
        let id: Uuid = row.try_get("id")?;
        let importance: Option<String> = row.try_get("importance")?;
        memories.push(MemoryEntry {
            id: id.to_string(),
            timestamp: row.try_get("recorded_at")?,
            kind: row.try_get("kind")?,
            content: row.try_get("content")?,
            agent: row.try_get("agent")?,
            tags: row.try_get("tags")?,
            metadata: importance.map(|importance| MemoryMetadata {
                importance: Some(importance),
                ..MemoryMetadata::default()
            }),
        });
    }

    Ok(memories)
}

/// Staking table rows plus staking rows logged as memories, merged by date.
pub async fn load_snapshot(pool: &PgPool, staking_limit: i64, memory_limit: i64) -> anyhow::Result<Snapshot> {
    let memories = fetch_recent_memories(pool, memory_limit).await?;
    let mut records = ingest::records_from_memories(&memories);
    records.extend(fetch_recent_staking(pool, staking_limit).await?);

    let mut records = build_series(records);
    let keep = usize::try_from(staking_limit).unwrap_or(usize::MAX);
    if records.len() > keep {
        let excess = records.len() - keep;
        records.drain(..excess);
    }

    Ok(Snapshot { records, memories })
}
