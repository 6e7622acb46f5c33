pub mod sqlite_store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{DedupRecord, OccurrenceKind};

/// Narrow a snapshot read by either dimension, or both.
#[derive(Debug, Default, Clone)]
pub struct SnapshotFilter {
    pub symbol_type: Option<String>,
    pub alert_policy_id: Option<String>,
}

impl SnapshotFilter {
    pub fn for_policy(policy_id: impl Into<String>) -> Self {
        Self {
            symbol_type: None,
            alert_policy_id: Some(policy_id.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomic increment-or-insert for one `(symbol, policy)` pairing.
    /// Returns the new observation count (1 on first insert).
    async fn increment_or_insert(
        &self,
        symbol: &str,
        symbol_type: &str,
        policy_id: &str,
        now_ms: i64,
    ) -> anyhow::Result<i64>;

    /// Read-only `symbol -> observation_count` view.
    async fn snapshot(&self, filter: &SnapshotFilter) -> anyhow::Result<HashMap<String, i64>>;

    /// Delete every row of one policy whose last update predates the
    /// watermark. Scoped per policy so one run can never eat another
    /// policy's history. Returns the number of rows removed.
    async fn prune_before(&self, policy_id: &str, watermark_ms: i64) -> anyhow::Result<u64>;

    /// All observation rows, for diagnostics and startup inspection.
    async fn load_all(&self) -> anyhow::Result<Vec<DedupRecord>>;

    /// Bump the daily/monthly occurrence counter for one alert firing,
    /// resetting the counter when the bucket rolls over.
    /// Returns the new count within the current bucket.
    async fn record_occurrence(
        &self,
        instrument: &str,
        alert_type: &str,
        kind: OccurrenceKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// Current-bucket occurrence count; zero when no bucket matches.
    async fn occurrence_count(
        &self,
        instrument: &str,
        alert_type: &str,
        kind: OccurrenceKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64>;
}
