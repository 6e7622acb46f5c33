//! Shared types for the policy layer.

use std::time::Duration;

use market::types::Timeframe;

/// A concrete alert flavor with its parameters.
///
/// The policy ID is the stable dedup key for the flavor + parameter
/// pairing; changing a parameter yields a new ID and therefore a fresh
/// dedup history.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertKind {
    /// Spot price above the moving average of the last `window` closes.
    MaCross { timeframe: Timeframe, window: usize },

    /// Latest closed bar's volume at least `multiple` times the mean of
    /// the preceding `window` bars.
    VolumeSpike {
        timeframe: Timeframe,
        window: usize,
        multiple: f64,
    },

    /// Absolute percentage move over the latest closed bar.
    PriceChange {
        timeframe: Timeframe,
        min_change_pct: f64,
    },
}

impl AlertKind {
    pub fn policy_id(&self) -> String {
        match self {
            AlertKind::MaCross { timeframe, window } => {
                format!("ma_cross_{}_{}", window, timeframe.suffix())
            }
            AlertKind::VolumeSpike {
                timeframe,
                window,
                multiple,
            } => format!(
                "volume_spike_{}x_{}_{}",
                multiple,
                window,
                timeframe.suffix()
            ),
            AlertKind::PriceChange {
                timeframe,
                min_change_pct,
            } => format!("price_change_{}pct_{}", min_change_pct, timeframe.suffix()),
        }
    }

    /// Human-readable label used in notification text.
    pub fn label(&self) -> String {
        match self {
            AlertKind::MaCross { timeframe, window } => {
                format!("MA crossover ({} bars, {})", window, timeframe.suffix())
            }
            AlertKind::VolumeSpike {
                timeframe,
                window,
                multiple,
            } => format!(
                "Volume spike ({}x over {} bars, {})",
                multiple,
                window,
                timeframe.suffix()
            ),
            AlertKind::PriceChange {
                timeframe,
                min_change_pct,
            } => format!("Price change >= {}% ({})", min_change_pct, timeframe.suffix()),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        match self {
            AlertKind::MaCross { timeframe, .. } => *timeframe,
            AlertKind::VolumeSpike { timeframe, .. } => *timeframe,
            AlertKind::PriceChange { timeframe, .. } => *timeframe,
        }
    }
}

/// Configuration knobs for one engine instance.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Symbol-type tag persisted with every dedup row (e.g. "spot").
    pub symbol_type: String,

    /// Bound on the evaluation fan-out; each symbol's evaluation may block
    /// on network calls, so this caps in-flight upstream requests.
    pub max_concurrency: usize,

    /// Per-symbol evaluation deadline. A timed-out symbol is treated as
    /// "does not qualify" for this run only.
    pub eval_timeout: Duration,

    /// Retry budget for collaborator calls.
    pub max_fetch_attempts: u32,
    pub fetch_backoff: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            symbol_type: "spot".to_string(),
            max_concurrency: 8,
            eval_timeout: Duration::from_secs(10),
            max_fetch_attempts: 3,
            fetch_backoff: Duration::from_millis(250),
        }
    }
}

/// Operator-facing outcome of one alerting run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub policy_id: String,

    /// Symbols satisfying the policy this run, sorted.
    pub qualifying: Vec<String>,

    pub newly_added: Vec<String>,
    pub newly_removed: Vec<String>,

    /// Symbols whose evaluation failed or timed out; they were treated as
    /// not qualifying, and their presence marks the run as incomplete.
    pub failed_symbols: Vec<String>,

    pub pruned_rows: u64,
}
