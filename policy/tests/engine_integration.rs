
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use ledger::model::OccurrenceKind;
use ledger::store::DedupStore;
use market::sources::{BarSource, PriceSource, UniverseSource};
use market::types::{Bar, Instrument, Timeframe, TrackedKey};
use notify::dispatcher::Dispatcher;
use notify::sink::NotificationSink;
use policy::engine::PolicyEngine;
use policy::stream_alerts::StreamAlertConsumer;
use policy::types::{AlertKind, PolicyConfig};
use signal::types::{CrossDirection, TransitionAlert, TransitionEvent};

use mock_store::MockStore;

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedMarket {
    universe: HashSet<Instrument>,
    bars: HashMap<String, Vec<Bar>>,
    prices: HashMap<String, f64>,
    failing: HashSet<String>,
}

impl ScriptedMarket {
    fn with_universe(symbols: &[&str]) -> Self {
        Self {
            universe: symbols.iter().map(Instrument::new).collect(),
            ..Self::default()
        }
    }

    fn bars_for(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(Instrument::new(symbol).as_str().into(), bars);
        self
    }

    fn price_for(mut self, symbol: &str, price: f64) -> Self {
        self.prices
            .insert(Instrument::new(symbol).as_str().into(), price);
        self
    }

    fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.insert(Instrument::new(symbol).as_str().into());
        self
    }
}

#[async_trait]
impl BarSource for ScriptedMarket {
    async fn recent_bars(
        &self,
        instrument: &Instrument,
        _timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Bar>> {
        if self.failing.contains(instrument.as_str()) {
            anyhow::bail!("scripted outage for {instrument}");
        }

        let bars = self
            .bars
            .get(instrument.as_str())
            .cloned()
            .unwrap_or_default();
        let skip = bars.len().saturating_sub(count);

        Ok(bars[skip..].to_vec())
    }
}

#[async_trait]
impl PriceSource for ScriptedMarket {
    async fn current_price(&self, instrument: &Instrument) -> anyhow::Result<f64> {
        self.prices
            .get(instrument.as_str())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no scripted price for {instrument}"))
    }
}

#[async_trait]
impl UniverseSource for ScriptedMarket {
    async fn qualifying_universe(&self) -> anyhow::Result<HashSet<Instrument>> {
        Ok(self.universe.clone())
    }
}

#[derive(Default)]
struct CollectingSink {
    sent: Mutex<Vec<(String, bool)>>,
}

impl CollectingSink {
    async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn send(&self, text: &str, highlighted: bool) -> anyhow::Result<()> {
        self.sent.lock().await.push((text.to_string(), highlighted));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bar(open: f64, close: f64, volume: f64) -> Bar {
    Bar {
        open_time_ms: 0,
        close_time_ms: 1,
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume,
    }
}

fn fast_cfg() -> PolicyConfig {
    PolicyConfig {
        symbol_type: "spot".to_string(),
        max_concurrency: 4,
        eval_timeout: Duration::from_secs(2),
        max_fetch_attempts: 1,
        fetch_backoff: Duration::from_millis(1),
    }
}

fn engine(
    market: Arc<ScriptedMarket>,
    store: Arc<MockStore>,
    dispatcher: Arc<Dispatcher>,
) -> PolicyEngine<MockStore> {
    PolicyEngine::new(
        market.clone(),
        market.clone(),
        market,
        store,
        dispatcher,
        fast_cfg(),
    )
}

async fn wait_for_messages(sink: &Arc<CollectingSink>, at_least: usize) {
    for _ in 0..500 {
        if sink.sent.lock().await.len() >= at_least {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("sink never received {at_least} messages");
}

// ---------------------------------------------------------------------------
// Run-to-run diff workflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_runs_diff_and_count_correctly() {
    let kind = AlertKind::PriceChange {
        timeframe: Timeframe::H1,
        min_change_pct: 5.0,
    };

    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    // Run A: {AAA, BBB} qualify.
    let market_a = Arc::new(
        ScriptedMarket::with_universe(&["AAA-USDT", "BBB-USDT"])
            .bars_for("AAA-USDT", vec![bar(100.0, 110.0, 1.0)])
            .bars_for("BBB-USDT", vec![bar(100.0, 92.0, 1.0)]),
    );

    let report_a = engine(market_a, store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    assert_eq!(report_a.qualifying, vec!["AAA-USDT", "BBB-USDT"]);
    assert_eq!(report_a.newly_added, vec!["AAA-USDT", "BBB-USDT"]);
    assert!(report_a.newly_removed.is_empty());

    // Run B: {BBB, CCC} qualify; AAA fell out of the universe.
    let market_b = Arc::new(
        ScriptedMarket::with_universe(&["BBB-USDT", "CCC-USDT"])
            .bars_for("BBB-USDT", vec![bar(100.0, 110.0, 1.0)])
            .bars_for("CCC-USDT", vec![bar(100.0, 120.0, 1.0)]),
    );

    let report_b = engine(market_b, store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    assert_eq!(report_b.newly_added, vec!["CCC-USDT"]);
    assert_eq!(report_b.newly_removed, vec!["AAA-USDT"]);
    assert_eq!(report_b.pruned_rows, 1);

    // BBB was confirmed in consecutive runs; AAA's history is gone.
    let policy_id = kind.policy_id();
    assert_eq!(store.count("BBB-USDT", &policy_id).await, Some(2));
    assert_eq!(store.count("AAA-USDT", &policy_id).await, None);
}

#[tokio::test]
async fn symbol_returning_after_a_gap_restarts_its_counter() {
    let kind = AlertKind::PriceChange {
        timeframe: Timeframe::H1,
        min_change_pct: 5.0,
    };

    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    let qualifying = || {
        Arc::new(
            ScriptedMarket::with_universe(&["AAA-USDT"])
                .bars_for("AAA-USDT", vec![bar(100.0, 110.0, 1.0)]),
        )
    };
    let empty = || Arc::new(ScriptedMarket::with_universe(&[]));

    engine(qualifying(), store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    // The gap run prunes the unconfirmed row.
    engine(empty(), store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    let report = engine(qualifying(), store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    assert_eq!(report.newly_added, vec!["AAA-USDT"]);
    assert_eq!(store.count("AAA-USDT", &kind.policy_id()).await, Some(1));
}

#[tokio::test]
async fn excluded_symbols_never_appear_as_dropped() {
    let kind = AlertKind::PriceChange {
        timeframe: Timeframe::H1,
        min_change_pct: 5.0,
    };

    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    let market_a = Arc::new(
        ScriptedMarket::with_universe(&["AAA-USDT"])
            .bars_for("AAA-USDT", vec![bar(100.0, 110.0, 1.0)]),
    );
    engine(market_a, store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    let market_b = Arc::new(ScriptedMarket::with_universe(&[]));
    let excluded: HashSet<String> = HashSet::from(["AAA-USDT".to_string()]);

    let report = engine(market_b, store.clone(), dispatcher.clone())
        .run(&kind, &excluded)
        .await
        .unwrap();

    assert!(report.newly_removed.is_empty());
    // The row is still pruned; exclusion only shapes the notification.
    assert_eq!(report.pruned_rows, 1);
}

// ---------------------------------------------------------------------------
// Per-symbol failure absorption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn per_symbol_failure_does_not_abort_the_run() {
    let kind = AlertKind::PriceChange {
        timeframe: Timeframe::H1,
        min_change_pct: 5.0,
    };

    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    let market = Arc::new(
        ScriptedMarket::with_universe(&["AAA-USDT", "BBB-USDT"])
            .bars_for("AAA-USDT", vec![bar(100.0, 110.0, 1.0)])
            .failing_for("BBB-USDT"),
    );

    let report = engine(market, store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    assert_eq!(report.qualifying, vec!["AAA-USDT"]);
    assert_eq!(report.failed_symbols, vec!["BBB-USDT"]);

    // The summary is visibly incomplete.
    wait_for_messages(&sink, 2).await;
    let texts = sink.texts().await;
    assert!(texts[0].contains("1 symbols failed to evaluate"));
}

// ---------------------------------------------------------------------------
// Other flavors end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ma_cross_flavor_uses_spot_against_window_mean() {
    let kind = AlertKind::MaCross {
        timeframe: Timeframe::H4,
        window: 4,
    };

    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    let history = vec![
        bar(10.0, 10.0, 1.0),
        bar(20.0, 20.0, 1.0),
        bar(30.0, 30.0, 1.0),
        bar(40.0, 40.0, 1.0),
    ];

    // Mean of closes is 25: ABOVE is above it, UNDER is not.
    let market = Arc::new(
        ScriptedMarket::with_universe(&["ABOVE", "UNDER"])
            .bars_for("ABOVE", history.clone())
            .price_for("ABOVE", 26.0)
            .bars_for("UNDER", history)
            .price_for("UNDER", 24.0),
    );

    let report = engine(market, store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    assert_eq!(report.qualifying, vec!["ABOVE"]);
}

#[tokio::test]
async fn volume_spike_flavor_compares_against_prior_bars() {
    let kind = AlertKind::VolumeSpike {
        timeframe: Timeframe::H1,
        window: 4,
        multiple: 3.0,
    };

    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    let mut spiky = vec![bar(10.0, 10.0, 100.0); 4];
    spiky.push(bar(10.0, 10.0, 350.0));

    let mut quiet = vec![bar(10.0, 10.0, 100.0); 4];
    quiet.push(bar(10.0, 10.0, 120.0));

    let market = Arc::new(
        ScriptedMarket::with_universe(&["SPIKY", "QUIET"])
            .bars_for("SPIKY", spiky)
            .bars_for("QUIET", quiet),
    );

    let report = engine(market, store.clone(), dispatcher.clone())
        .run(&kind, &HashSet::new())
        .await
        .unwrap();

    assert_eq!(report.qualifying, vec!["SPIKY"]);
}

// ---------------------------------------------------------------------------
// Streaming transition path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_consumer_formats_counts_and_highlights() {
    let store = Arc::new(MockStore::new());
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), Duration::from_millis(1));

    let (tx, rx) = mpsc::channel(8);
    let consumer = StreamAlertConsumer::new(store.clone(), dispatcher.clone());
    tokio::spawn(consumer.run(rx));

    let alert = |direction, value| TransitionAlert {
        key: TrackedKey::new(Instrument::new("BTC-USDT"), Timeframe::H4),
        event: TransitionEvent {
            direction,
            value,
            mean: 25.0,
        },
        bar_close_ms: 1,
    };

    tx.send(alert(CrossDirection::Crossover, 26.0)).await.unwrap();
    tx.send(alert(CrossDirection::Crossunder, 24.0)).await.unwrap();

    wait_for_messages(&sink, 2).await;

    let sent = sink.sent.lock().await.clone();
    assert!(sent[0].0.contains("crossover"));
    assert!(sent[0].0.contains("#1 today"));
    assert!(sent[0].1, "crossovers are highlighted");

    assert!(sent[1].0.contains("crossunder"));
    assert!(!sent[1].1);

    // Both directions were counted separately.
    assert_eq!(
        store
            .occurrence_count("BTC-USDT", "crossover", OccurrenceKind::Daily, Utc::now())
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .occurrence_count("BTC-USDT", "crossunder", OccurrenceKind::Monthly, Utc::now())
            .await
            .unwrap(),
        1
    );
}
