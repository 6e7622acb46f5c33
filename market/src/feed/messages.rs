//! Serde model of the combined-stream kline payload.
//!
//! The transport multiplexes every subscribed topic over one socket and wraps
//! each update in an envelope naming the originating stream. Numeric fields
//! arrive as strings and are parsed during conversion, never trusted raw.

use serde::Deserialize;

use crate::error::FeedError;
use crate::types::{Bar, BarEvent, Instrument, Timeframe, TrackedKey};

#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    pub stream: String,
    pub data: KlineEvent,
}

#[derive(Debug, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,

    #[serde(rename = "E")]
    pub event_time_ms: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub open_time_ms: u64,

    #[serde(rename = "T")]
    pub close_time_ms: u64,

    #[serde(rename = "i")]
    pub interval: String,

    #[serde(rename = "o")]
    pub open: String,

    #[serde(rename = "h")]
    pub high: String,

    #[serde(rename = "l")]
    pub low: String,

    #[serde(rename = "c")]
    pub close: String,

    #[serde(rename = "v")]
    pub volume: String,

    /// Bar-close flag: false while the interval is still forming.
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl StreamEnvelope {
    /// Convert the decoded wire message into a `BarEvent`.
    ///
    /// Fails on unknown intervals or unparseable numeric fields; callers
    /// drop and log, they never propagate a malformed message into the
    /// ingestion path.
    pub fn into_bar_event(self) -> Result<BarEvent, FeedError> {
        let k = self.data.kline;

        let timeframe: Timeframe = k
            .interval
            .parse()
            .map_err(|_| FeedError::UnknownTimeframe(k.interval.clone()))?;

        let bar = Bar {
            open_time_ms: k.open_time_ms,
            close_time_ms: k.close_time_ms,
            open: parse_price(&k.open)?,
            high: parse_price(&k.high)?,
            low: parse_price(&k.low)?,
            close: parse_price(&k.close)?,
            volume: parse_price(&k.volume)?,
        };

        Ok(BarEvent {
            key: TrackedKey::new(Instrument::new(&self.data.symbol), timeframe),
            bar,
            is_closed: k.is_closed,
        })
    }
}

fn parse_price(raw: &str) -> Result<f64, FeedError> {
    raw.parse::<f64>()
        .map_err(|_| FeedError::Malformed(format!("non-numeric field: {raw:?}")))
}
