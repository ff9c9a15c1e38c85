//! Timing and size measurements for document loads.
//!
//! Adapters report each load to an injected [`MeasurementSink`] through a
//! [`Measurement`] guard. A guard dropped without [`Measurement::stop`] counts
//! as aborted, so early returns via `?` are measured correctly.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::fetch::AdapterKind;

/// Receiver of start/stop/abort events keyed by adapter kind.
pub trait MeasurementSink: Send + Sync + fmt::Debug {
    /// A load started.
    fn started(&self, kind: AdapterKind);

    /// A load finished with `bytes` of content.
    fn stopped(&self, kind: AdapterKind, bytes: u64, elapsed: Duration);

    /// A load failed or was abandoned.
    fn aborted(&self, kind: AdapterKind, elapsed: Duration);
}

/// In-flight measurement of one load.
#[derive(Debug)]
#[must_use = "a dropped measurement is recorded as aborted"]
pub struct Measurement {
    sink: Arc<dyn MeasurementSink>,
    kind: AdapterKind,
    started_at: Instant,
    finished: bool,
}

impl Measurement {
    /// Starts measuring a load of the given kind.
    pub fn begin(sink: Arc<dyn MeasurementSink>, kind: AdapterKind) -> Self {
        sink.started(kind);
        Self {
            sink,
            kind,
            started_at: Instant::now(),
            finished: false,
        }
    }

    /// Records a successful load of `bytes`.
    pub fn stop(mut self, bytes: u64) {
        self.finished = true;
        self.sink
            .stopped(self.kind, bytes, self.started_at.elapsed());
    }

    /// Records a failed load.
    pub fn abort(mut self) {
        self.finished = true;
        self.sink.aborted(self.kind, self.started_at.elapsed());
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        if !self.finished {
            self.sink.aborted(self.kind, self.started_at.elapsed());
        }
    }
}

/// Sink that emits every event as a `tracing` debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MeasurementSink for TracingSink {
    fn started(&self, kind: AdapterKind) {
        debug!(adapter = kind.as_str(), "load started");
    }

    fn stopped(&self, kind: AdapterKind, bytes: u64, elapsed: Duration) {
        debug!(
            adapter = kind.as_str(),
            bytes,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "load finished"
        );
    }

    fn aborted(&self, kind: AdapterKind, elapsed: Duration) {
        debug!(
            adapter = kind.as_str(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "load aborted"
        );
    }
}

/// Per-kind counters for one adapter kind.
#[derive(Debug, Default)]
struct KindCounters {
    started: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
    bytes: AtomicU64,
    elapsed_ms: AtomicU64,
}

/// Snapshot of the counters for one adapter kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSummary {
    /// Loads started.
    pub started: u64,
    /// Loads finished successfully.
    pub completed: u64,
    /// Loads failed or abandoned.
    pub aborted: u64,
    /// Total bytes of completed loads.
    pub bytes: u64,
    /// Total milliseconds spent in completed and aborted loads.
    pub elapsed_ms: u64,
}

/// Sink accumulating atomic counters per adapter kind.
///
/// Safe to share between concurrent crawl workers.
#[derive(Debug, Default)]
pub struct ProfileStats {
    kinds: [KindCounters; AdapterKind::COUNT],
}

impl ProfileStats {
    /// Creates a stats sink with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters recorded for `kind`.
    #[must_use]
    pub fn summary(&self, kind: AdapterKind) -> KindSummary {
        let counters = &self.kinds[kind.index()];
        KindSummary {
            started: counters.started.load(Ordering::SeqCst),
            completed: counters.completed.load(Ordering::SeqCst),
            aborted: counters.aborted.load(Ordering::SeqCst),
            bytes: counters.bytes.load(Ordering::SeqCst),
            elapsed_ms: counters.elapsed_ms.load(Ordering::SeqCst),
        }
    }

    fn add_elapsed(counters: &KindCounters, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        counters.elapsed_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl MeasurementSink for ProfileStats {
    fn started(&self, kind: AdapterKind) {
        self.kinds[kind.index()]
            .started
            .fetch_add(1, Ordering::SeqCst);
    }

    fn stopped(&self, kind: AdapterKind, bytes: u64, elapsed: Duration) {
        let counters = &self.kinds[kind.index()];
        counters.completed.fetch_add(1, Ordering::SeqCst);
        counters.bytes.fetch_add(bytes, Ordering::SeqCst);
        Self::add_elapsed(counters, elapsed);
    }

    fn aborted(&self, kind: AdapterKind, elapsed: Duration) {
        let counters = &self.kinds[kind.index()];
        counters.aborted.fetch_add(1, Ordering::SeqCst);
        Self::add_elapsed(counters, elapsed);
    }
}
