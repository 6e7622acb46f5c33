//! TickRouter
//!
//! Consumes decoded bar events from the streaming feed and drives the
//! per-series windows and comparators.
//! Responsibilities:
//!   • Ignore bars that are still forming (partial values never feed a window)
//!   • Validate before applying; malformed bars are dropped and logged
//!   • Resolve (instrument, timeframe) to its window/comparator state
//!   • Serialize same-key updates under a per-key lock while distinct keys
//!     proceed in parallel
//!   • Forward transitions to the policy layer over an mpsc channel
//!
//! The router is designed as an Arc-managed async service so long-lived
//! tasks can capture it without lifetime issues.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{
    Mutex,
    mpsc::{Receiver, Sender},
};
use tracing::{debug, info, warn};

use market::types::{Bar, BarEvent, TrackedKey};

use crate::comparator::MeanComparator;
use crate::rolling_window::RollingWindow;
use crate::types::TransitionAlert;

/// Per-key ingestion state. Exclusively owned by its TrackedKey and mutated
/// only under the per-key lock.
pub struct KeyState {
    pub price_window: RollingWindow,
    pub volume_window: RollingWindow,
    comparator: MeanComparator,
}

impl KeyState {
    pub fn new(price_capacity: usize, volume_capacity: usize) -> Self {
        Self {
            price_window: RollingWindow::new(price_capacity),
            volume_window: RollingWindow::new(volume_capacity),
            comparator: MeanComparator::new(),
        }
    }
}

pub struct TickRouter {
    /// Per-key state. The outer lock is held only long enough to clone the
    /// per-key Arc; updates happen under the inner lock.
    keys: Mutex<HashMap<TrackedKey, Arc<Mutex<KeyState>>>>,

    alert_tx: Sender<TransitionAlert>,

    price_capacity: usize,
    volume_capacity: usize,

    /// Close time of the most recently applied bar, for liveness checks.
    last_event_ms: AtomicU64,
}

impl TickRouter {
    pub fn new(
        alert_tx: Sender<TransitionAlert>,
        price_capacity: usize,
        volume_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            keys: Mutex::new(HashMap::new()),
            alert_tx,
            price_capacity,
            volume_capacity,
            last_event_ms: AtomicU64::new(0),
        })
    }

    /// Register a tracked series and seed its windows from historical bars.
    ///
    /// Called at policy start-up so the comparator begins against a full
    /// window instead of alerting off a half-warm mean.
    pub async fn register(&self, key: TrackedKey, seed_closes: &[f64], seed_volumes: &[f64]) {
        let mut state = KeyState::new(self.price_capacity, self.volume_capacity);
        state.price_window.seed(seed_closes);
        state.volume_window.seed(seed_volumes);

        let mut keys = self.keys.lock().await;
        keys.insert(key.clone(), Arc::new(Mutex::new(state)));

        info!(key = %key.id(), seeded = seed_closes.len(), "registered tracked series");
    }

    /// Apply one decoded stream update.
    pub async fn on_bar(&self, event: BarEvent) {
        if !event.is_closed {
            // Forming bars are observed but never applied.
            return;
        }

        if !validate(&event.bar) {
            warn!(key = %event.key.id(), bar = ?event.bar, "dropping invalid bar");
            return;
        }

        let state = {
            let mut keys = self.keys.lock().await;
            match keys.get(&event.key) {
                Some(existing) => Arc::clone(existing),
                None => {
                    // Unseeded key: start a cold window rather than dropping
                    // data; the comparator stays silent until it is warm.
                    let fresh = Arc::new(Mutex::new(KeyState::new(
                        self.price_capacity,
                        self.volume_capacity,
                    )));
                    keys.insert(event.key.clone(), Arc::clone(&fresh));
                    fresh
                }
            }
        };

        let transition = {
            let mut guard = state.lock().await;

            guard.volume_window.push(event.bar.volume);
            let mean = guard.price_window.push(event.bar.close);

            if guard.price_window.is_full() {
                guard.comparator.evaluate(event.bar.close, mean)
            } else {
                debug!(key = %event.key.id(), filled = guard.price_window.len(), "window warming");
                None
            }
        };

        self.last_event_ms
            .store(event.bar.close_time_ms, Ordering::Relaxed);

        if let Some(transition) = transition {
            let alert = TransitionAlert {
                key: event.key,
                event: transition,
                bar_close_ms: event.bar.close_time_ms,
            };

            if self.alert_tx.send(alert).await.is_err() {
                warn!("transition channel closed, alert discarded");
            }
        }
    }

    /// Main loop: consume bar events until the feed channel closes.
    pub async fn run(self: Arc<Self>, mut rx: Receiver<BarEvent>) {
        while let Some(event) = rx.recv().await {
            self.on_bar(event).await;
        }

        info!("bar event stream ended");
    }

    pub fn last_event_ms(&self) -> u64 {
        self.last_event_ms.load(Ordering::Relaxed)
    }

    /// Liveness check used to decide when the feed needs a fresh
    /// subscription.
    pub fn is_stale(&self, now_ms: u64, max_silence_ms: u64) -> bool {
        let last = self.last_event_ms();
        last > 0 && now_ms.saturating_sub(last) > max_silence_ms
    }
}

/// Validate-then-apply: a bar that fails here must never touch a window.
fn validate(bar: &Bar) -> bool {
    bar.open.is_finite()
        && bar.open > 0.0
        && bar.close.is_finite()
        && bar.close > 0.0
        && bar.volume.is_finite()
        && bar.volume >= 0.0
}
