use std::str::FromStr;

use market::types::Timeframe;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string for the dedup ledger.
    pub database_url: String,

    /// Base WebSocket endpoint of the bar stream.
    pub feed_ws_url: String,

    /// Instruments to track, comma separated (INSTRUMENTS env).
    pub instruments: Vec<String>,

    /// Timeframes to track for every instrument (TIMEFRAMES env,
    /// comma-separated interval tokens such as "1h,4h").
    pub timeframes: Vec<Timeframe>,

    // =========================
    // Ingestion configuration
    // =========================
    /// Capacity of the price window backing the spot-vs-MA comparator.
    pub price_window_bars: usize,

    /// Capacity of the volume window kept per tracked series.
    pub volume_window_bars: usize,

    /// Longest stream silence (ms) tolerated before the feed connection is
    /// treated as stale and replaced with a fresh subscription.
    pub feed_read_timeout_ms: u64,

    // =========================
    // Dispatch configuration
    // =========================
    /// Messages-per-minute ceiling imposed by the downstream messaging
    /// endpoint. The drain loop spaces transmissions to stay under it.
    pub messages_per_minute: u64,

    // =========================
    // Policy configuration
    // =========================
    /// Seconds between batch alerting runs.
    pub run_interval_secs: u64,

    /// TTL for the cached instrument universe. Runs inside one TTL window
    /// reuse the same universe instead of refetching it.
    pub universe_cache_ttl_secs: u64,

    /// Moving-average window (bars) for the crossover flavor.
    pub ma_window: usize,

    /// Baseline window and multiple for the volume-spike flavor.
    pub volume_spike_window: usize,
    pub volume_spike_multiple: f64,

    /// Threshold for the price-change flavor, absolute percent per bar.
    pub min_price_change_pct: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://alerts_dev.db".to_string());

        let feed_ws_url = std::env::var("FEED_WS_URL")
            .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string());

        let instruments = std::env::var("INSTRUMENTS")
            .unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let timeframes = std::env::var("TIMEFRAMES")
            .unwrap_or_else(|_| "1h,4h".to_string())
            .split(',')
            .filter_map(|s| Timeframe::from_str(s.trim()).ok())
            .collect();

        Self {
            database_url,
            feed_ws_url,
            instruments,
            timeframes,

            // Ingestion defaults: windows sized for MA-style baselines.
            price_window_bars: env_parse("PRICE_WINDOW_BARS", 90),
            volume_window_bars: env_parse("VOLUME_WINDOW_BARS", 24),
            feed_read_timeout_ms: env_parse("FEED_READ_TIMEOUT_MS", 45_000),

            // Dispatch defaults: stay well under typical endpoint ceilings.
            messages_per_minute: env_parse("MESSAGES_PER_MINUTE", 20),

            // Policy defaults.
            run_interval_secs: env_parse("RUN_INTERVAL_SECS", 4 * 3600),
            universe_cache_ttl_secs: env_parse("UNIVERSE_CACHE_TTL_SECS", 3600),
            ma_window: env_parse("MA_WINDOW", 90),
            volume_spike_window: env_parse("VOLUME_SPIKE_WINDOW", 24),
            volume_spike_multiple: env_parse("VOLUME_SPIKE_MULTIPLE", 3.0),
            min_price_change_pct: env_parse("MIN_PRICE_CHANGE_PCT", 5.0),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
