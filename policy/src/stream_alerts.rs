//! Streaming transition-alert consumer.
//!
//! Sits between the ingestion router and the dispatcher: each transition is
//! formatted into a notification and counted against the daily and monthly
//! occurrence tables. Crossovers are highlighted; crossunders are not.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

use ledger::model::OccurrenceKind;
use ledger::store::DedupStore;
use notify::dispatcher::{Dispatcher, NotificationItem};
use signal::types::{CrossDirection, TransitionAlert};

pub struct StreamAlertConsumer<S> {
    store: Arc<S>,
    dispatcher: Arc<Dispatcher>,
}

impl<S: DedupStore> StreamAlertConsumer<S> {
    pub fn new(store: Arc<S>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Main loop: consumes transitions until the router side closes.
    pub async fn run(self, mut rx: Receiver<TransitionAlert>) {
        while let Some(alert) = rx.recv().await {
            self.handle(alert).await;
        }

        info!("transition alert stream ended");
    }

    async fn handle(&self, alert: TransitionAlert) {
        let now = Utc::now();
        let instrument = alert.key.instrument.as_str();
        let alert_type = alert.event.direction.to_string();

        // Occurrence-counter failures degrade the notification (count shown
        // as 0) rather than suppressing it.
        let daily = self
            .store
            .record_occurrence(instrument, &alert_type, OccurrenceKind::Daily, now)
            .await
            .unwrap_or_else(|e| {
                warn!(instrument, error = %e, "daily occurrence record failed");
                0
            });

        if let Err(e) = self
            .store
            .record_occurrence(instrument, &alert_type, OccurrenceKind::Monthly, now)
            .await
        {
            warn!(instrument, error = %e, "monthly occurrence record failed");
        }

        let text = format_transition(&alert, daily);

        let item = match alert.event.direction {
            CrossDirection::Crossover => NotificationItem::highlighted(text),
            CrossDirection::Crossunder => NotificationItem::new(text),
        };

        self.dispatcher.enqueue(item).await;
    }
}

pub fn format_transition(alert: &TransitionAlert, daily_count: i64) -> String {
    format!(
        "{} {}: {:.4} vs MA {:.4} (#{} today)",
        alert.key.id(),
        alert.event.direction,
        alert.event.value,
        alert.event.mean,
        daily_count,
    )
}
