//! Client for the exchange's combined kline WebSocket stream.
//!
//! This client:
//! - subscribes to every `(instrument, timeframe)` topic in one combined stream
//! - decodes kline updates into `BarEvent`s
//! - forwards events into an mpsc channel for the ingestion router
//! - reconnects after errors and re-subscribes to the same topic set, so an
//!   interrupted connection never replays a backlog

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use super::messages::StreamEnvelope;
use crate::types::{BarEvent, TrackedKey};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub struct BarStreamClient {
    ws_url: String,

    /// Longest silence tolerated before the connection is treated as stale
    /// and replaced with a fresh subscription.
    read_timeout: Duration,
}

impl BarStreamClient {
    pub fn new(ws_url: String, read_timeout: Duration) -> Self {
        Self {
            ws_url,
            read_timeout,
        }
    }

    /// Combined-stream URL for a topic set, e.g.
    /// `wss://host/stream?streams=btcusdt@kline_4h/ethusdt@kline_1h`.
    fn combined_stream_url(&self, topics: &[TrackedKey]) -> String {
        let streams = topics
            .iter()
            .map(|key| key.topic())
            .collect::<Vec<_>>()
            .join("/");

        format!("{}/stream?streams={}", self.ws_url, streams)
    }

    /// Main WebSocket event loop.
    ///
    /// Responsibilities:
    /// 1. Connect to the combined stream (auto-reconnect).
    /// 2. Continuously read incoming messages with a staleness timeout.
    /// 3. Decode kline envelopes; drop anything out of schema.
    /// 4. Forward `BarEvent`s into the mpsc channel.
    ///
    /// This loop never stops unless the whole application is shut down.
    pub async fn run_ws_loop(
        &self,
        topics: Vec<TrackedKey>,
        sender: Sender<BarEvent>,
    ) -> anyhow::Result<()> {
        let url = self.combined_stream_url(&topics);

        loop {
            info!(url = %url, topics = topics.len(), "connecting to bar stream");

            match connect_async(&url).await {
                Ok((ws, _)) => {
                    info!("bar stream connected");
                    let (_write, mut read) = ws.split();

                    loop {
                        let next = tokio::time::timeout(self.read_timeout, read.next()).await;

                        let msg = match next {
                            Err(_) => {
                                warn!(
                                    timeout_ms = self.read_timeout.as_millis() as u64,
                                    "no stream traffic within timeout, re-subscribing"
                                );
                                break;
                            }
                            Ok(None) => {
                                warn!("bar stream closed by remote");
                                break;
                            }
                            Ok(Some(Err(e))) => {
                                error!(error = %e, "websocket error");
                                break;
                            }
                            Ok(Some(Ok(m))) => m,
                        };

                        // Ping/pong and binary frames are transport noise here.
                        if !msg.is_text() {
                            continue;
                        }

                        let raw = match msg.to_text() {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(error = %e, "dropping undecodable text frame");
                                continue;
                            }
                        };

                        match serde_json::from_str::<StreamEnvelope>(raw) {
                            Ok(envelope) => match envelope.into_bar_event() {
                                Ok(event) => {
                                    if sender.send(event).await.is_err() {
                                        // Receiver gone: the router shut down.
                                        info!("bar event channel closed, stopping stream");
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!(error = %e, "dropping malformed bar update"),
                            },
                            Err(e) => warn!(error = %e, "dropping out-of-schema stream message"),
                        }
                    }
                }

                Err(e) => error!(error = %e, "websocket connection failed"),
            }

            info!(delay_ms = RECONNECT_DELAY.as_millis() as u64, "reconnecting");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}
