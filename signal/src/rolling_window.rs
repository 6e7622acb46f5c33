use std::collections::VecDeque;

/// Fixed-capacity window over the most recent samples of one tracked series.
///
/// Append is O(1): once the window is full every push evicts exactly one
/// oldest sample, and the mean is maintained incrementally from the running
/// sum rather than recomputed.
#[derive(Debug)]
pub struct RollingWindow {
    buf: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be non-zero");

        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Initialize from a historical backfill batch.
    ///
    /// Keeps only the most recent `capacity` samples, oldest discarded first.
    /// Any previous contents are replaced.
    pub fn seed(&mut self, values: &[f64]) {
        self.buf.clear();
        self.sum = 0.0;

        let skip = values.len().saturating_sub(self.capacity);
        for &v in &values[skip..] {
            self.buf.push_back(v);
            self.sum += v;
        }
    }

    /// Append one sample and return the new mean.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.buf.len() == self.capacity {
            if let Some(evicted) = self.buf.pop_front() {
                self.sum -= evicted;
            }
        }

        self.buf.push_back(value);
        self.sum += value;

        self.mean()
    }

    /// Current incremental mean. Zero while the window is empty.
    pub fn mean(&self) -> f64 {
        if self.buf.is_empty() {
            0.0
        } else {
            self.sum / self.buf.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
