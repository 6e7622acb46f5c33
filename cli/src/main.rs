pub mod config;

use std::collections::{HashSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use common::logger::init_logger;
use config::AppConfig;
use ledger::store::sqlite_store::SqliteDedupStore;
use market::cache::CachedUniverse;
use market::feed::BarStreamClient;
use market::sources::{BarSource, PriceSource, UniverseSource};
use market::types::{Bar, Instrument, Timeframe, TrackedKey};
use notify::dispatcher::Dispatcher;
use notify::sink::NotificationSink;
use policy::engine::PolicyEngine;
use policy::stream_alerts::StreamAlertConsumer;
use policy::types::{AlertKind, PolicyConfig};
use signal::router::TickRouter;

/// Placeholder sink that logs instead of transmitting.
/// TODO: Replace with the real messaging-endpoint client.
struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, text: &str, highlighted: bool) -> anyhow::Result<()> {
        info!(highlighted, "notification: {text}");
        Ok(())
    }
}

/// Placeholder market-data collaborator backed by the configured instrument
/// list. Serves the universe; bar history and spot prices are not available
/// until a real REST client is wired in.
/// TODO: Replace with the real exchange REST client.
struct StaticMarketData {
    instruments: HashSet<Instrument>,
    prices: HashMap<String, f64>,
}

#[async_trait]
impl UniverseSource for StaticMarketData {
    async fn qualifying_universe(&self) -> anyhow::Result<HashSet<Instrument>> {
        Ok(self.instruments.clone())
    }
}

#[async_trait]
impl BarSource for StaticMarketData {
    async fn recent_bars(
        &self,
        _instrument: &Instrument,
        _timeframe: Timeframe,
        _count: usize,
    ) -> anyhow::Result<Vec<Bar>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl PriceSource for StaticMarketData {
    async fn current_price(&self, instrument: &Instrument) -> anyhow::Result<f64> {
        self.prices
            .get(instrument.as_str())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no price source configured for {instrument}"))
    }
}

fn tracked_keys(cfg: &AppConfig) -> Vec<TrackedKey> {
    cfg.instruments
        .iter()
        .flat_map(|symbol| {
            cfg.timeframes
                .iter()
                .map(move |tf| TrackedKey::new(Instrument::new(symbol), *tf))
        })
        .collect()
}

fn alert_kinds(cfg: &AppConfig) -> Vec<AlertKind> {
    let timeframe = cfg.timeframes.first().copied().unwrap_or(Timeframe::H4);

    vec![
        AlertKind::MaCross {
            timeframe,
            window: cfg.ma_window,
        },
        AlertKind::VolumeSpike {
            timeframe,
            window: cfg.volume_spike_window,
            multiple: cfg.volume_spike_multiple,
        },
        AlertKind::PriceChange {
            timeframe,
            min_change_pct: cfg.min_price_change_pct,
        },
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("alert-engine");

    let cfg = AppConfig::from_env();
    info!(?cfg, "starting");

    // Durable dedup ledger; failure to open it is fatal.
    let store = Arc::new(SqliteDedupStore::new(&cfg.database_url).await?);

    let sink = Arc::new(LogSink);
    let dispatcher = Dispatcher::new(
        sink,
        Dispatcher::interval_for_rate(cfg.messages_per_minute),
    );

    // Streaming path: feed -> router -> transition consumer.
    let (bar_tx, bar_rx) = tokio::sync::mpsc::channel(1024);
    let (alert_tx, alert_rx) = tokio::sync::mpsc::channel(256);

    let router = TickRouter::new(alert_tx, cfg.price_window_bars, cfg.volume_window_bars);
    let keys = tracked_keys(&cfg);
    for key in &keys {
        router.register(key.clone(), &[], &[]).await;
    }

    tokio::spawn(Arc::clone(&router).run(bar_rx));

    let consumer = StreamAlertConsumer::new(Arc::clone(&store), Arc::clone(&dispatcher));
    tokio::spawn(consumer.run(alert_rx));

    let feed = BarStreamClient::new(
        cfg.feed_ws_url.clone(),
        Duration::from_millis(cfg.feed_read_timeout_ms),
    );
    tokio::spawn(async move {
        if let Err(e) = feed.run_ws_loop(keys, bar_tx).await {
            error!(error = %e, "bar stream loop ended");
        }
    });

    // Batch path: periodic policy runs over the (cached) universe.
    let market_data = Arc::new(StaticMarketData {
        instruments: cfg.instruments.iter().map(Instrument::new).collect(),
        prices: HashMap::new(),
    });
    let universe = Arc::new(CachedUniverse::new(
        market_data.clone(),
        Duration::from_secs(cfg.universe_cache_ttl_secs),
    ));

    let engine = PolicyEngine::new(
        universe,
        market_data.clone(),
        market_data,
        store,
        dispatcher,
        PolicyConfig::default(),
    );

    let kinds = alert_kinds(&cfg);
    let excluded = HashSet::new();

    loop {
        for kind in &kinds {
            match engine.run(kind, &excluded).await {
                Ok(report) => info!(
                    policy = %report.policy_id,
                    qualifying = report.qualifying.len(),
                    failed = report.failed_symbols.len(),
                    "run finished"
                ),
                Err(e) => error!(policy = %kind.policy_id(), error = %e, "run failed"),
            }
        }

        tokio::time::sleep(Duration::from_secs(cfg.run_interval_secs)).await;
    }
}
