//! Capability traits for the external market-data collaborators, plus the
//! bounded retry helper used at those boundaries.
//!
//! The engine never talks to an exchange API directly; it is composed from
//! injected `BarSource` / `PriceSource` / `UniverseSource` instances.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{Bar, Instrument, Timeframe};

#[async_trait]
pub trait BarSource: Send + Sync {
    /// The most recent `count` *closed* bars, oldest first.
    async fn recent_bars(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Bar>>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, instrument: &Instrument) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait UniverseSource: Send + Sync {
    /// The instrument set a policy run should consider.
    async fn qualifying_universe(&self) -> anyhow::Result<HashSet<Instrument>>;
}

/// Run `op` up to `max_attempts` times with linear backoff between attempts.
///
/// Backoff for attempt `n` is `base_delay * n` plus sub-second jitter.
/// The final error is returned once the budget is exhausted; callers at the
/// collaborator boundary degrade that to "no data this cycle".
pub async fn retry_with_backoff<T, F, Fut>(
    mut op: F,
    max_attempts: u32,
    base_delay: Duration,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    debug_assert!(max_attempts >= 1);

    let mut last_err = anyhow::anyhow!("retry budget was zero");

    for attempt in 1..=max_attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(attempt, max_attempts, error = %e, "source call failed");
                last_err = e;

                if attempt < max_attempts {
                    tokio::time::sleep(base_delay * attempt + jitter()).await;
                }
            }
        }
    }

    Err(last_err)
}

/// Clock-derived jitter keeps simultaneous retriers from re-aligning without
/// pulling a rand crate into the workspace.
fn jitter() -> Duration {
    let micros = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_micros() as u64)
        .unwrap_or(0);

    Duration::from_millis(micros % 250)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let out = retry_with_backoff(
            move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(7u32)
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let out = retry_with_backoff(
            move || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        anyhow::bail!("transient");
                    }
                    Ok(99u32)
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert_eq!(out, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let out: anyhow::Result<u32> = retry_with_backoff(
            move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("still down")
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
