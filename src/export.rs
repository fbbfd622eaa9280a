//! Export boundary for ended spans.
//!
//! The core pushes [`SpanData`] to a [`SpanSink`] and knows nothing about
//! wire formats or backends. Metric snapshots travel the other way: pull
//! them with [`Recorder::collect`](crate::recorder::Recorder::collect).

use crate::span::SpanData;
use parking_lot::Mutex;

/// Receives ended spans.
///
/// Implementations come from the embedding application. Calls happen
/// synchronously from [`Tracer::end_span`](crate::span::Tracer::end_span),
/// so implementations should hand off quickly rather than block.
pub trait SpanSink: Send + Sync {
    /// Accepts the record of an ended span.
    fn export(&self, span: SpanData);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSpanSink;

impl NullSpanSink {
    /// Creates a discarding sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SpanSink for NullSpanSink {
    fn export(&self, _span: SpanData) {}
}

/// A sink that buffers ended spans in memory.
///
/// Intended for tests: end spans, then inspect what arrived.
#[derive(Debug, Default)]
pub struct InMemorySpanSink {
    spans: Mutex<Vec<SpanData>>,
}

impl InMemorySpanSink {
    /// Creates an empty buffer sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the finished spans in export order.
    #[must_use]
    pub fn finished(&self) -> Vec<SpanData> {
        self.spans.lock().clone()
    }

    /// Removes and returns the finished spans.
    #[must_use]
    pub fn take(&self) -> Vec<SpanData> {
        std::mem::take(&mut *self.spans.lock())
    }

    /// Returns the number of buffered spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    /// Returns true if no spans are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    /// Drops all buffered spans.
    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanSink for InMemorySpanSink {
    fn export(&self, span: SpanData) {
        self.spans.lock().push(span);
    }
}
