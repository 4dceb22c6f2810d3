use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ingest-side counters for operational visibility.
#[derive(Clone, Debug, Default)]
pub struct IngestCounters {
    pub ticks_accepted: Arc<AtomicU64>,
    pub ticks_foreign_channel: Arc<AtomicU64>,
    pub rpc_results: Arc<AtomicU64>,
    pub rpc_errors: Arc<AtomicU64>,
    pub malformed: Arc<AtomicU64>,
}

/// Point-in-time copy of [`IngestCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestCountersSnapshot {
    pub ticks_accepted: u64,
    pub ticks_foreign_channel: u64,
    pub rpc_results: u64,
    pub rpc_errors: u64,
    pub malformed: u64,
}

impl IngestCounters {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestCountersSnapshot {
        IngestCountersSnapshot {
            ticks_accepted: self.ticks_accepted.load(Ordering::Relaxed),
            ticks_foreign_channel: self.ticks_foreign_channel.load(Ordering::Relaxed),
            rpc_results: self.rpc_results.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}
