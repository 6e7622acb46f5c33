//! Rate-limited outbound notification queue.
//!
//! Two operating modes:
//!   • `send_now` transmits immediately; the caller absorbs back-pressure.
//!   • `enqueue` appends under a lock and returns; a single background drain
//!     loop pops FIFO and transmits one chunk per rate-limit interval.
//!
//! There is never more than one concurrent drain loop per dispatcher: the
//! loop is guarded by an atomic flag, and the exit path re-checks the queue
//! after releasing the flag so a racing enqueue is never stranded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::sink::{MAX_PAYLOAD_CHARS, NotificationSink, split_payload};

/// One logical outbound message. Oversized text is split into ordered
/// chunks at enqueue time; the chunks travel as a unit.
#[derive(Debug, Clone)]
pub struct NotificationItem {
    pub text: String,
    pub highlighted: bool,
}

impl NotificationItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: false,
        }
    }

    pub fn highlighted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: true,
        }
    }
}

#[derive(Debug)]
struct QueuedChunk {
    text: String,
    highlighted: bool,
}

pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    queue: Mutex<VecDeque<QueuedChunk>>,
    drain_active: AtomicBool,
    send_interval: Duration,
    payload_limit: usize,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, send_interval: Duration) -> Arc<Self> {
        Self::with_payload_limit(sink, send_interval, MAX_PAYLOAD_CHARS)
    }

    pub fn with_payload_limit(
        sink: Arc<dyn NotificationSink>,
        send_interval: Duration,
        payload_limit: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            sink,
            queue: Mutex::new(VecDeque::new()),
            drain_active: AtomicBool::new(false),
            send_interval,
            payload_limit,
        })
    }

    /// Interval implied by a messages-per-minute ceiling.
    pub fn interval_for_rate(messages_per_minute: u64) -> Duration {
        Duration::from_millis(60_000 / messages_per_minute.max(1))
    }

    /// Synchronous mode: transmit immediately (chunked), propagating the
    /// first transport error to the caller.
    pub async fn send_now(&self, item: NotificationItem) -> anyhow::Result<()> {
        for chunk in split_payload(&item.text, self.payload_limit) {
            self.sink.send(&chunk, item.highlighted).await?;
        }

        Ok(())
    }

    /// Queued mode: append and return. All chunks of one item are enqueued
    /// under a single lock acquisition, so chunks of different items never
    /// interleave.
    pub async fn enqueue(self: &Arc<Self>, item: NotificationItem) {
        {
            let mut queue = self.queue.lock().await;
            for chunk in split_payload(&item.text, self.payload_limit) {
                queue.push_back(QueuedChunk {
                    text: chunk,
                    highlighted: item.highlighted,
                });
            }
        }

        self.ensure_drain_task();
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn is_draining(&self) -> bool {
        self.drain_active.load(Ordering::Acquire)
    }

    /// Start the drain loop iff no loop currently holds the flag.
    fn ensure_drain_task(self: &Arc<Self>) {
        if self
            .drain_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let dispatcher = Arc::clone(self);
            tokio::spawn(async move {
                dispatcher.drain_loop().await;
            });
        }
    }

    /// Pops FIFO and transmits at the rate-limit interval. A transport
    /// failure on one item is logged and the loop moves on; the item is not
    /// retried.
    async fn drain_loop(self: Arc<Self>) {
        loop {
            loop {
                let chunk = { self.queue.lock().await.pop_front() };
                let Some(chunk) = chunk else { break };

                if let Err(e) = self.sink.send(&chunk.text, chunk.highlighted).await {
                    warn!(error = %e, "notification send failed, skipping item");
                }

                tokio::time::sleep(self.send_interval).await;
            }

            self.drain_active.store(false, Ordering::Release);

            // An enqueue may have appended between the empty observation and
            // the flag release; only continue if we win the flag back.
            let has_work = !self.queue.lock().await.is_empty();
            if has_work
                && self
                    .drain_active
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                continue;
            }

            return;
        }
    }
}
