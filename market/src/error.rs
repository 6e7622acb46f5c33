use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("websocket connection failed: {0}")]
    Connect(String),

    #[error("malformed stream message: {0}")]
    Malformed(String),

    #[error("unknown timeframe in stream message: {0}")]
    UnknownTimeframe(String),
}
