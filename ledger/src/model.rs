use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// One persisted dedup observation.
///
/// `observation_count` is the number of *consecutive* runs in which the
/// symbol satisfied the policy; a run that misses the symbol prunes the row,
/// so reappearance starts over at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupRecord {
    pub tracked_symbol: String,
    pub symbol_type: String,
    pub alert_policy_id: String,
    pub observation_count: i64,
    pub last_update_ms: i64,
}

/// Bucket granularity for the occurrence counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceKind {
    Daily,
    Monthly,
}

impl OccurrenceKind {
    /// Bucket key for a timestamp: `2026-08-06` for daily, `2026-08` for
    /// monthly. Counters reset when the key changes.
    pub fn bucket_key(&self, at: DateTime<Utc>) -> String {
        match self {
            OccurrenceKind::Daily => at.format("%Y-%m-%d").to_string(),
            OccurrenceKind::Monthly => at.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for OccurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OccurrenceKind::Daily => "daily",
            OccurrenceKind::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for OccurrenceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(OccurrenceKind::Daily),
            "monthly" => Ok(OccurrenceKind::Monthly),
            other => Err(anyhow::anyhow!("Invalid occurrence kind: {}", other)),
        }
    }
}
