use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// One mark-price observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
    /// Milliseconds since the Unix epoch, as reported by the feed.
    pub timestamp: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Time-bounded window of price points, ordered by arrival.
///
/// Not thread-safe on its own; see [`WindowStore`] for the shared handle.
#[derive(Debug)]
pub struct SlidingWindow {
    points: VecDeque<PricePoint>,
    window_ms: i64,
}

impl SlidingWindow {
    pub fn new(window_ms: i64) -> Self {
        Self {
            points: VecDeque::new(),
            window_ms,
        }
    }

    /// Appends at the tail, then evicts every head point older than
    /// `point.timestamp - window_ms`.
    ///
    /// The caller's timestamp is accepted as-is; out-of-order points are
    /// not rejected.
    pub fn push(&mut self, point: PricePoint) {
        self.points.push_back(point);
        self.evict_old(point.timestamp);
    }

    fn evict_old(&mut self, now_ms: i64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while let Some(front) = self.points.front() {
            if front.timestamp < cutoff {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn oldest(&self) -> Option<&PricePoint> {
        self.points.front()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    /// Owned copy of the current contents, oldest first.
    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.points.iter().copied().collect()
    }
}

/// Shared handle to a [`SlidingWindow`].
///
/// Clones point at the same window. `append`, `snapshot` and `size` are all
/// serialized through one mutex, so a snapshot never sees a half-evicted
/// window.
#[derive(Clone, Debug)]
pub struct WindowStore {
    inner: Arc<Mutex<SlidingWindow>>,
}

impl WindowStore {
    pub fn new(window_ms: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlidingWindow::new(window_ms))),
        }
    }

    /// Insert + evict as one atomic step.
    pub fn append(&self, point: PricePoint) {
        let mut w = self.inner.lock();
        w.push(point);
        tracing::trace!(
            ts_ms = point.timestamp,
            price = point.price,
            size = w.len(),
            "window append"
        );
    }

    /// Independent copy of the window at a single instant.
    pub fn snapshot(&self) -> Vec<PricePoint> {
        self.inner.lock().to_vec()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }
}
