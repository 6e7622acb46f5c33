use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A tradable instrument identifier.
///
/// Identity is case-insensitive: the symbol is normalized to uppercase on
/// construction, so `Instrument::new("btc-usdt") == Instrument::new("BTC-USDT")`
/// and both hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used when building stream topic names.
    pub fn stream_symbol(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bar interval tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Interval token as used in stream topic names ("15m", "1h", ...).
    pub fn suffix(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn bar_millis(&self) -> u64 {
        match self {
            Timeframe::M15 => 15 * 60 * 1_000,
            Timeframe::H1 => 60 * 60 * 1_000,
            Timeframe::H4 => 4 * 60 * 60 * 1_000,
            Timeframe::D1 => 24 * 60 * 60 * 1_000,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(anyhow::anyhow!("Invalid timeframe value: {}", other)),
        }
    }
}

/// Identifies one monitored series: an instrument on one timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedKey {
    pub instrument: Instrument,
    pub timeframe: Timeframe,
}

impl TrackedKey {
    pub fn new(instrument: Instrument, timeframe: Timeframe) -> Self {
        Self {
            instrument,
            timeframe,
        }
    }

    pub fn id(&self) -> String {
        format!("{}@{}", self.instrument, self.timeframe.suffix())
    }

    /// Stream topic for this key, e.g. `btcusdt@kline_4h`.
    pub fn topic(&self) -> String {
        format!(
            "{}@kline_{}",
            self.instrument.stream_symbol(),
            self.timeframe.suffix()
        )
    }
}

/// One interval's aggregated price sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open_time_ms: u64,
    pub close_time_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Percentage move over the bar, positive or negative.
    /// Returns None when the open is not a usable divisor.
    pub fn change_pct(&self) -> Option<f64> {
        if self.open <= 0.0 || !self.open.is_finite() {
            return None;
        }
        Some((self.close - self.open) / self.open * 100.0)
    }
}

/// A decoded stream update for one tracked series.
///
/// `is_closed == false` means the bar is still forming and must never feed
/// a rolling window.
#[derive(Debug, Clone)]
pub struct BarEvent {
    pub key: TrackedKey,
    pub bar: Bar,
    pub is_closed: bool,
}
