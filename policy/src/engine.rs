//! The policy engine.
//!
//! For each alerting run it:
//!   1. Fetches the qualifying universe from the injected source.
//!   2. Evaluates every symbol against the alert flavor, fanned out across
//!      a bounded number of in-flight evaluations.
//!   3. Feeds confirmations into the dedup store.
//!   4. Diffs the current set against the previous run's snapshot.
//!   5. Prunes rows the current run did not re-confirm.
//!   6. Enqueues the summary and the newly-added / newly-dropped lists.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tracing::{error, info, warn};

use ledger::store::{DedupStore, SnapshotFilter};
use market::sources::{BarSource, PriceSource, UniverseSource, retry_with_backoff};
use market::types::Instrument;
use notify::dispatcher::{Dispatcher, NotificationItem};

use crate::diff::diff_against_previous;
use crate::evaluators;
use crate::types::{AlertKind, PolicyConfig, RunReport};

/// Composes sources, evaluators, the dedup store and the dispatcher into
/// complete alerting runs. One engine serves any number of alert flavors.
pub struct PolicyEngine<S> {
    universe: Arc<dyn UniverseSource>,
    bars: Arc<dyn BarSource>,
    prices: Arc<dyn PriceSource>,
    store: Arc<S>,
    dispatcher: Arc<Dispatcher>,
    cfg: PolicyConfig,
}

impl<S: DedupStore> PolicyEngine<S> {
    pub fn new(
        universe: Arc<dyn UniverseSource>,
        bars: Arc<dyn BarSource>,
        prices: Arc<dyn PriceSource>,
        store: Arc<S>,
        dispatcher: Arc<Dispatcher>,
        cfg: PolicyConfig,
    ) -> Self {
        Self {
            universe,
            bars,
            prices,
            store,
            dispatcher,
            cfg,
        }
    }

    /// One full alerting run for `kind`.
    ///
    /// Structural failures (universe unreachable after retries, snapshot
    /// unreadable) abort the run before any store mutation, so the prune
    /// step can never delete history that merely went unconfirmed because
    /// the run itself was broken. Per-symbol failures are absorbed as
    /// "does not qualify" and surfaced in the report.
    pub async fn run(
        &self,
        kind: &AlertKind,
        excluded: &HashSet<String>,
    ) -> anyhow::Result<RunReport> {
        let policy_id = kind.policy_id();
        let watermark_ms = Utc::now().timestamp_millis();

        let universe = retry_with_backoff(
            || self.universe.qualifying_universe(),
            self.cfg.max_fetch_attempts,
            self.cfg.fetch_backoff,
        )
        .await?;

        info!(policy = %policy_id, universe = universe.len(), "starting alerting run");

        // The previous run's view must be read before any increment; the
        // diff below needs pre-run counts.
        let previous = self
            .store
            .snapshot(&SnapshotFilter::for_policy(policy_id.clone()))
            .await?;

        let results: Vec<(Instrument, Option<bool>)> = futures::stream::iter(universe)
            .map(|instrument| async move {
                let outcome = tokio::time::timeout(
                    self.cfg.eval_timeout,
                    self.evaluate_symbol(kind, &instrument),
                )
                .await;

                let verdict = match outcome {
                    Ok(Ok(qualifies)) => Some(qualifies),
                    Ok(Err(e)) => {
                        warn!(symbol = %instrument, error = %e, "evaluation failed");
                        None
                    }
                    Err(_) => {
                        warn!(symbol = %instrument, "evaluation timed out");
                        None
                    }
                };

                (instrument, verdict)
            })
            .buffer_unordered(self.cfg.max_concurrency.max(1))
            .collect()
            .await;

        let mut qualifying = HashSet::new();
        let mut failed_symbols = Vec::new();

        for (instrument, verdict) in results {
            match verdict {
                Some(true) => {
                    qualifying.insert(instrument.as_str().to_string());
                }
                Some(false) => {}
                None => failed_symbols.push(instrument.as_str().to_string()),
            }
        }

        // Record confirmations. A storage failure for one symbol is
        // surfaced but does not abort the run; the row keeps its old
        // timestamp and falls to the prune below, exactly as an
        // unconfirmed symbol would.
        for symbol in &qualifying {
            if let Err(e) = self
                .store
                .increment_or_insert(symbol, &self.cfg.symbol_type, &policy_id, watermark_ms)
                .await
            {
                warn!(symbol, error = %e, "dedup increment failed");
                failed_symbols.push(symbol.clone());
            }
        }

        let diff = diff_against_previous(&previous, &qualifying, excluded);

        let pruned_rows = match self.store.prune_before(&policy_id, watermark_ms).await {
            Ok(n) => n,
            Err(e) => {
                error!(policy = %policy_id, error = %e, "prune failed, stale rows deferred");
                0
            }
        };

        let mut qualifying: Vec<String> = qualifying.into_iter().collect();
        qualifying.sort();
        failed_symbols.sort();
        failed_symbols.dedup();

        let report = RunReport {
            policy_id: policy_id.clone(),
            qualifying,
            newly_added: diff.newly_added,
            newly_removed: diff.newly_removed,
            failed_symbols,
            pruned_rows,
        };

        self.notify(kind, &report).await;

        info!(
            policy = %policy_id,
            qualifying = report.qualifying.len(),
            added = report.newly_added.len(),
            removed = report.newly_removed.len(),
            failed = report.failed_symbols.len(),
            "alerting run complete"
        );

        Ok(report)
    }

    async fn evaluate_symbol(
        &self,
        kind: &AlertKind,
        instrument: &Instrument,
    ) -> anyhow::Result<bool> {
        match kind {
            AlertKind::MaCross { timeframe, window } => {
                let bars = retry_with_backoff(
                    || self.bars.recent_bars(instrument, *timeframe, *window),
                    self.cfg.max_fetch_attempts,
                    self.cfg.fetch_backoff,
                )
                .await?;

                let spot = self.prices.current_price(instrument).await?;

                Ok(evaluators::spot_above_ma(spot, &bars, *window))
            }

            AlertKind::VolumeSpike {
                timeframe,
                window,
                multiple,
            } => {
                let bars = retry_with_backoff(
                    || self.bars.recent_bars(instrument, *timeframe, *window + 1),
                    self.cfg.max_fetch_attempts,
                    self.cfg.fetch_backoff,
                )
                .await?;

                Ok(evaluators::volume_spike(&bars, *window, *multiple))
            }

            AlertKind::PriceChange {
                timeframe,
                min_change_pct,
            } => {
                let bars = retry_with_backoff(
                    || self.bars.recent_bars(instrument, *timeframe, 1),
                    self.cfg.max_fetch_attempts,
                    self.cfg.fetch_backoff,
                )
                .await?;

                Ok(evaluators::price_change_breach(&bars, *min_change_pct))
            }
        }
    }

    /// Summary first, then the added list (highlighted) and the dropped
    /// list. Empty lists are not sent.
    async fn notify(&self, kind: &AlertKind, report: &RunReport) {
        self.dispatcher
            .enqueue(NotificationItem::new(format_run_summary(kind, report)))
            .await;

        if !report.newly_added.is_empty() {
            let text = format!("Newly added: {}", report.newly_added.join(", "));
            self.dispatcher
                .enqueue(NotificationItem::highlighted(text))
                .await;
        }

        if !report.newly_removed.is_empty() {
            let text = format!("Newly dropped: {}", report.newly_removed.join(", "));
            self.dispatcher.enqueue(NotificationItem::new(text)).await;
        }
    }
}

/// One-line operator summary. A run that absorbed per-symbol failures is
/// visibly incomplete.
pub fn format_run_summary(kind: &AlertKind, report: &RunReport) -> String {
    let mut line = format!(
        "{}: {} qualifying, {} new, {} dropped",
        kind.label(),
        report.qualifying.len(),
        report.newly_added.len(),
        report.newly_removed.len(),
    );

    if !report.failed_symbols.is_empty() {
        line.push_str(&format!(
            " ({} symbols failed to evaluate)",
            report.failed_symbols.len()
        ));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use market::types::Timeframe;

    #[test]
    fn summary_marks_incomplete_runs() {
        let kind = AlertKind::PriceChange {
            timeframe: Timeframe::H1,
            min_change_pct: 5.0,
        };

        let mut report = RunReport {
            policy_id: kind.policy_id(),
            qualifying: vec!["BTC-USDT".into()],
            newly_added: vec!["BTC-USDT".into()],
            ..RunReport::default()
        };

        let clean = format_run_summary(&kind, &report);
        assert!(!clean.contains("failed"));

        report.failed_symbols = vec!["ETH-USDT".into()];
        let incomplete = format_run_summary(&kind, &report);
        assert!(incomplete.contains("1 symbols failed to evaluate"));
    }
}
