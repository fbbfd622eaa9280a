//! Spans and the tracer that runs their lifecycle.
//!
//! A span's parent is fixed at creation time: it is the active span of the
//! context handed to [`Tracer::start_span`], wherever that context has
//! travelled. The span itself is open for attributes until it is ended;
//! ending is terminal, and the resulting [`SpanData`] goes to the tracer's
//! sink. A second end, or an attribute write after the end, is a reported
//! error, never a retry.

use crate::clock::TimeSource;
use crate::context::Context;
use crate::export::SpanSink;
use crate::types::{SpanId, Time};
use core::fmt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from span lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpanError {
    /// The span has already ended. Ended spans are immutable.
    #[error("span already ended")]
    AlreadyEnded,
}

/// An attribute value attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// A string attribute.
    String(String),
    /// A signed integer attribute.
    I64(i64),
    /// A floating point attribute.
    F64(f64),
    /// A boolean attribute.
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => f.write_str(v),
            Self::I64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// The immutable record of an ended span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanData {
    /// The span's identifier.
    pub id: SpanId,
    /// The parent span, if the span was started under an active span.
    pub parent_id: Option<SpanId>,
    /// The span name given at start.
    pub name: String,
    /// Attributes set while the span was open.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Start time from the tracer's clock.
    pub start: Time,
    /// End time from the tracer's clock.
    pub end: Time,
}

impl SpanData {
    /// Returns the span duration in nanoseconds.
    #[must_use]
    pub fn duration_nanos(&self) -> u64 {
        self.end.duration_since(self.start)
    }
}

#[derive(Debug)]
enum SpanState {
    Open {
        attributes: BTreeMap<String, AttributeValue>,
    },
    Ended,
}

#[derive(Debug)]
struct SpanInner {
    id: SpanId,
    parent_id: Option<SpanId>,
    name: String,
    start: Time,
    state: Mutex<SpanState>,
}

/// A unit of work in progress.
///
/// Clones share the same span; putting a clone into a [`Context`] and
/// ending through any clone is the intended use.
#[derive(Debug, Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl Span {
    /// Returns the span's identifier.
    #[must_use]
    pub fn id(&self) -> SpanId {
        self.inner.id
    }

    /// Returns the parent span's identifier, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<SpanId> {
        self.inner.parent_id
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the start time.
    #[must_use]
    pub fn start(&self) -> Time {
        self.inner.start
    }

    /// Returns true once the span has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        matches!(*self.inner.state.lock(), SpanState::Ended)
    }

    /// Sets an attribute on the open span.
    ///
    /// Fails with [`SpanError::AlreadyEnded`] after the span has ended;
    /// the recorded data is not changed in that case.
    pub fn set_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), SpanError> {
        let mut state = self.inner.state.lock();
        match &mut *state {
            SpanState::Open { attributes } => {
                attributes.insert(key.into(), value.into());
                Ok(())
            }
            SpanState::Ended => Err(SpanError::AlreadyEnded),
        }
    }

    /// Transitions open to ended and builds the export record.
    fn finish(&self, end: Time) -> Result<SpanData, SpanError> {
        let mut state = self.inner.state.lock();
        match std::mem::replace(&mut *state, SpanState::Ended) {
            SpanState::Open { attributes } => Ok(SpanData {
                id: self.inner.id,
                parent_id: self.inner.parent_id,
                name: self.inner.name.clone(),
                attributes,
                start: self.inner.start,
                end,
            }),
            SpanState::Ended => Err(SpanError::AlreadyEnded),
        }
    }
}

/// Starts and ends spans.
///
/// The tracer owns the two external collaborators of the span lifecycle:
/// the clock that stamps start and end times and the sink that receives
/// ended spans. Both are injected; there is no global tracer.
#[derive(Clone)]
pub struct Tracer {
    clock: Arc<dyn TimeSource>,
    sink: Arc<dyn SpanSink>,
}

impl Tracer {
    /// Creates a tracer over the given clock and sink.
    #[must_use]
    pub fn new(clock: Arc<dyn TimeSource>, sink: Arc<dyn SpanSink>) -> Self {
        Self { clock, sink }
    }

    /// Starts a span whose parent is the active span of `context`.
    ///
    /// The parent link is fixed here and never changes. The caller decides
    /// whether to make the new span active via
    /// [`Context::with_span`](crate::context::Context::with_span).
    #[must_use]
    pub fn start_span(&self, name: impl Into<String>, context: &Context) -> Span {
        Span {
            inner: Arc::new(SpanInner {
                id: SpanId::new(),
                parent_id: context.active_span_id(),
                name: name.into(),
                start: self.clock.now(),
                state: Mutex::new(SpanState::Open {
                    attributes: BTreeMap::new(),
                }),
            }),
        }
    }

    /// Ends a span and hands its record to the sink.
    ///
    /// Ending is terminal. A second end fails with
    /// [`SpanError::AlreadyEnded`] and exports nothing.
    pub fn end_span(&self, span: &Span) -> Result<(), SpanError> {
        let data = span.finish(self.clock.now())?;
        #[cfg(feature = "tracing-integration")]
        tracing::trace!(span = %data.id, parent = ?data.parent_id, name = %data.name, "span ended");
        self.sink.export(data);
        Ok(())
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::export::InMemorySpanSink;
    use std::time::Duration;

    fn test_tracer() -> (Tracer, Arc<ManualClock>, Arc<InMemorySpanSink>) {
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(InMemorySpanSink::new());
        let tracer = Tracer::new(clock.clone(), sink.clone());
        (tracer, clock, sink)
    }

    #[test]
    fn root_span_has_no_parent() {
        let (tracer, _, _) = test_tracer();
        let span = tracer.start_span("root", &Context::root());
        assert!(span.parent_id().is_none());
        assert!(!span.is_ended());
    }

    #[test]
    fn parent_comes_from_context_active_span() {
        let (tracer, _, _) = test_tracer();
        let parent = tracer.start_span("parent", &Context::root());
        let ctx = Context::root().with_span(parent.clone());

        let child = tracer.start_span("child", &ctx);
        assert_eq!(child.parent_id(), Some(parent.id()));

        // Grandchild through a derived context.
        let child_ctx = ctx.with_span(child.clone());
        let grandchild = tracer.start_span("grandchild", &child_ctx);
        assert_eq!(grandchild.parent_id(), Some(child.id()));
    }

    #[test]
    fn end_exports_span_data() {
        let (tracer, clock, sink) = test_tracer();
        clock.set(Time::from_millis(10));
        let span = tracer.start_span("work", &Context::root());
        span.set_attribute("items", 3i64).unwrap();
        clock.advance(Duration::from_millis(15));
        tracer.end_span(&span).unwrap();

        let finished = sink.take();
        assert_eq!(finished.len(), 1);
        let data = &finished[0];
        assert_eq!(data.name, "work");
        assert_eq!(data.start, Time::from_millis(10));
        assert_eq!(data.end, Time::from_millis(25));
        assert_eq!(data.duration_nanos(), 15_000_000);
        assert_eq!(data.attributes.get("items"), Some(&AttributeValue::I64(3)));
        assert!(span.is_ended());
    }

    #[test]
    fn double_end_reports_error_and_exports_once() {
        let (tracer, _, sink) = test_tracer();
        let span = tracer.start_span("once", &Context::root());
        tracer.end_span(&span).unwrap();
        assert_eq!(tracer.end_span(&span), Err(SpanError::AlreadyEnded));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn attribute_after_end_rejected() {
        let (tracer, _, sink) = test_tracer();
        let span = tracer.start_span("sealed", &Context::root());
        span.set_attribute("before", true).unwrap();
        tracer.end_span(&span).unwrap();

        assert_eq!(
            span.set_attribute("after", true),
            Err(SpanError::AlreadyEnded)
        );
        let finished = sink.take();
        assert!(finished[0].attributes.contains_key("before"));
        assert!(!finished[0].attributes.contains_key("after"));
    }

    #[test]
    fn clones_share_the_span() {
        let (tracer, _, _) = test_tracer();
        let span = tracer.start_span("shared", &Context::root());
        let clone = span.clone();
        tracer.end_span(&clone).unwrap();
        assert!(span.is_ended());
    }

    #[test]
    fn span_data_serializes() {
        let (tracer, _, sink) = test_tracer();
        let span = tracer.start_span("encode", &Context::root());
        span.set_attribute("route", "/api").unwrap();
        tracer.end_span(&span).unwrap();

        let json = serde_json::to_value(&sink.take()[0]).unwrap();
        assert_eq!(json["name"], "encode");
        assert_eq!(json["attributes"]["route"]["String"], "/api");
    }
}
