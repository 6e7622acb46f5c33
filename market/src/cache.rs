//! Explicit TTL cache cell.
//!
//! Replaces process-wide mutable caches: the owner holds the cell, the cell
//! holds `(value, refreshed_at)`, and staleness is decided at read time.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::sources::UniverseSource;
use crate::types::Instrument;

pub struct TtlCell<T> {
    slot: Option<(T, Instant)>,
    ttl: Duration,
}

impl<T: Clone> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { slot: None, ttl }
    }

    /// The cached value, if it is still within its TTL.
    pub fn get(&self) -> Option<T> {
        match &self.slot {
            Some((value, refreshed_at)) if refreshed_at.elapsed() < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn put(&mut self, value: T) {
        self.slot = Some((value, Instant::now()));
    }

    /// Return the fresh cached value or run `fetch` and cache its result.
    ///
    /// A failed fetch leaves any stale value in place so the next call
    /// retries.
    pub async fn get_or_refresh<F, Fut>(&mut self, fetch: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let value = fetch().await?;
        self.put(value.clone());
        Ok(value)
    }
}

/// `UniverseSource` wrapper that refreshes through a `TtlCell`.
///
/// Repeated policy runs inside one TTL window reuse the same universe
/// instead of hitting the upstream provider every run.
pub struct CachedUniverse {
    inner: Arc<dyn UniverseSource>,
    cell: Mutex<TtlCell<HashSet<Instrument>>>,
}

impl CachedUniverse {
    pub fn new(inner: Arc<dyn UniverseSource>, ttl: Duration) -> Self {
        Self {
            inner,
            cell: Mutex::new(TtlCell::new(ttl)),
        }
    }
}

#[async_trait]
impl UniverseSource for CachedUniverse {
    async fn qualifying_universe(&self) -> anyhow::Result<HashSet<Instrument>> {
        let mut cell = self.cell.lock().await;
        cell.get_or_refresh(|| self.inner.qualifying_universe())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingUniverse {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UniverseSource for CountingUniverse {
        async fn qualifying_universe(&self) -> anyhow::Result<HashSet<Instrument>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HashSet::from([Instrument::new("BTC-USDT")]))
        }
    }

    #[tokio::test]
    async fn fresh_value_is_served_from_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let cached = CachedUniverse::new(
            Arc::new(CountingUniverse {
                calls: calls.clone(),
            }),
            Duration::from_secs(60),
        );

        let a = cached.qualifying_universe().await.unwrap();
        let b = cached.qualifying_universe().await.unwrap();

        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_value_triggers_refetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let cached = CachedUniverse::new(
            Arc::new(CountingUniverse {
                calls: calls.clone(),
            }),
            Duration::from_millis(10),
        );

        cached.qualifying_universe().await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        cached.qualifying_universe().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_does_not_poison_cell() {
        let mut cell: TtlCell<u32> = TtlCell::new(Duration::from_secs(60));

        let err = cell
            .get_or_refresh(|| async { anyhow::bail!("upstream down") })
            .await;
        assert!(err.is_err());

        let ok = cell.get_or_refresh(|| async { Ok(5) }).await.unwrap();
        assert_eq!(ok, 5);
        assert_eq!(cell.get(), Some(5));
    }
}
