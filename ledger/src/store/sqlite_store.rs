//! SqliteDedupStore
//! ----------------
//! SQLite-backed implementation of the `DedupStore` trait. It is the single
//! source of truth for cross-run alerting state:
//!
//!  - consecutive-run observation counters survive restarts
//!  - run-over-run set differences are computed against its snapshots
//!  - watermark pruning drops symbols that were not re-confirmed
//!  - daily/monthly occurrence counters back the streaming alert path

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{DedupStore, SnapshotFilter};
use crate::model::{DedupRecord, OccurrenceKind};

/// SQLite persistence backend for dedup state.
///
/// Provides:
///   - schema creation on startup
///   - single-statement atomic UPSERT for observation counters
///   - filterable snapshot reads
///   - watermark-based pruning
pub struct SqliteDedupStore {
    pool: SqlitePool,
}

impl SqliteDedupStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new SQLite-backed store and ensure the schema exists.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Creates tables if they do not exist.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_observations (
                tracked_symbol TEXT NOT NULL,
                symbol_type TEXT NOT NULL,
                alert_policy_id TEXT NOT NULL,

                observation_count INTEGER NOT NULL,
                last_update_ms INTEGER NOT NULL,

                PRIMARY KEY (tracked_symbol, alert_policy_id)
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_occurrences (
                instrument TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                count_type TEXT NOT NULL,

                bucket_start TEXT NOT NULL,
                hits INTEGER NOT NULL,

                PRIMARY KEY (instrument, alert_type, count_type)
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    /// Single-statement UPSERT so concurrent callers for different symbols
    /// never observe a half-applied increment.
    async fn increment_or_insert(
        &self,
        symbol: &str,
        symbol_type: &str,
        policy_id: &str,
        now_ms: i64,
    ) -> anyhow::Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO alert_observations (
                tracked_symbol, symbol_type, alert_policy_id,
                observation_count, last_update_ms
            )
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(tracked_symbol, alert_policy_id) DO UPDATE SET
                observation_count = observation_count + 1,
                symbol_type = excluded.symbol_type,
                last_update_ms = excluded.last_update_ms
            RETURNING observation_count;
        "#,
        )
        .bind(symbol)
        .bind(symbol_type)
        .bind(policy_id)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("observation_count"))
    }

    async fn snapshot(&self, filter: &SnapshotFilter) -> anyhow::Result<HashMap<String, i64>> {
        let mut sql = String::from(
            "SELECT tracked_symbol, observation_count FROM alert_observations WHERE 1 = 1",
        );

        if filter.symbol_type.is_some() {
            sql.push_str(" AND symbol_type = ?");
        }
        if filter.alert_policy_id.is_some() {
            sql.push_str(" AND alert_policy_id = ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(symbol_type) = &filter.symbol_type {
            query = query.bind(symbol_type);
        }
        if let Some(policy_id) = &filter.alert_policy_id {
            query = query.bind(policy_id);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(
                row.get::<String, _>("tracked_symbol"),
                row.get::<i64, _>("observation_count"),
            );
        }

        Ok(out)
    }

    async fn prune_before(&self, policy_id: &str, watermark_ms: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM alert_observations WHERE alert_policy_id = ? AND last_update_ms < ?",
        )
        .bind(policy_id)
        .bind(watermark_ms)
        .execute(&self.pool)
        .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            tracing::debug!(pruned, policy_id, watermark_ms, "pruned stale dedup rows");
        }

        Ok(pruned)
    }

    async fn load_all(&self) -> anyhow::Result<Vec<DedupRecord>> {
        let rows = sqlx::query("SELECT * FROM alert_observations")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(DedupRecord {
                tracked_symbol: row.get("tracked_symbol"),
                symbol_type: row.get("symbol_type"),
                alert_policy_id: row.get("alert_policy_id"),
                observation_count: row.get("observation_count"),
                last_update_ms: row.get("last_update_ms"),
            });
        }

        Ok(records)
    }

    /// Counter semantics live in one statement: same bucket increments,
    /// a rolled-over bucket resets to 1.
    async fn record_occurrence(
        &self,
        instrument: &str,
        alert_type: &str,
        kind: OccurrenceKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let bucket = kind.bucket_key(at);

        let row = sqlx::query(
            r#"
            INSERT INTO alert_occurrences (
                instrument, alert_type, count_type, bucket_start, hits
            )
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(instrument, alert_type, count_type) DO UPDATE SET
                hits = CASE
                    WHEN alert_occurrences.bucket_start = excluded.bucket_start
                        THEN alert_occurrences.hits + 1
                    ELSE 1
                END,
                bucket_start = excluded.bucket_start
            RETURNING hits;
        "#,
        )
        .bind(instrument)
        .bind(alert_type)
        .bind(kind.to_string())
        .bind(bucket)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("hits"))
    }

    async fn occurrence_count(
        &self,
        instrument: &str,
        alert_type: &str,
        kind: OccurrenceKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let bucket = kind.bucket_key(at);

        let row = sqlx::query(
            r#"
            SELECT hits FROM alert_occurrences
            WHERE instrument = ? AND alert_type = ? AND count_type = ? AND bucket_start = ?
        "#,
        )
        .bind(instrument)
        .bind(alert_type)
        .bind(kind.to_string())
        .bind(bucket)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<i64, _>("hits")).unwrap_or(0))
    }
}
