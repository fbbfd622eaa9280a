//! Vantage: in-process instrumentation core for Rust services.
//!
//! # Overview
//!
//! Vantage records what a process is doing while it is doing it. A
//! [`Measure`] is a named, dimensioned instrument; each distinct
//! combination of label values addresses one [`SubSeries`] that aggregates
//! samples (sum, count, distribution, last value). A thread-scoped
//! [`Context`] carries baggage and the active [`Span`] across call
//! boundaries, so a sample recorded deep in a call tree lands on the right
//! series and carries an exemplar pointing at the span that produced it.
//!
//! There is no process-wide instance. Everything hangs off a [`Recorder`]
//! that the binary constructs and hands to its libraries; [`Recorder::noop`]
//! gives the same surface with recording disabled.
//!
//! # Core Guarantees
//!
//! - **One series per label set**: get-or-create is atomic; concurrent
//!   recorders for the same labels always land on the same series
//! - **Synchronous validation**: bad names fail the build, bad values fail
//!   the record, and a failed record never creates or mutates a series
//! - **Consistent snapshots**: every aggregate in a series snapshot comes
//!   from the same instant
//! - **Scoped context**: attach/detach restores the exact prior state even
//!   when scopes are closed out of order
//! - **Deterministic testing**: time and span export are injected, so tests
//!   run on a manual clock and an in-memory sink
//!
//! # Module Structure
//!
//! - [`types`]: Core value types (timestamps, span identifiers, numeric kinds)
//! - [`label`]: Label keys, values, and ordered label sets
//! - [`aggregation`]: Aggregation kinds and bucket layouts
//! - [`series`]: Per-series aggregate state and snapshots
//! - [`measure`]: Measure definition, validation, and recording paths
//! - [`recorder`]: The instrumentation façade and instrument table
//! - [`context`]: Immutable contexts and the thread-scoped stack
//! - [`span`]: Spans and the tracer that starts and ends them
//! - [`export`]: Span sink boundary and test sinks
//! - [`clock`]: Injectable time sources

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]

pub mod aggregation;
pub mod clock;
pub mod context;
pub mod export;
pub mod label;
pub mod measure;
pub mod recorder;
pub mod series;
pub mod span;
pub mod types;

// Re-exports for convenient access to core types
pub use aggregation::{AggregationKind, AggregationSet, BucketLayout};
pub use clock::{ManualClock, TimeSource, WallClock};
pub use context::{Context, ContextError, ContextScope, ScopeToken};
pub use export::{InMemorySpanSink, NullSpanSink, SpanSink};
pub use label::{LabelKey, LabelSet, LabelValue};
pub use measure::{
    Measure, MeasureBuilder, MeasureError, MeasureSnapshot, Measurement, NAME_MAX_LEN, RecordError,
    SubSeries,
};
pub use recorder::{Recorder, RecorderBuilder, ValidationPolicy};
pub use series::{DistributionSnapshot, Exemplar, SeriesSnapshot};
pub use span::{AttributeValue, Span, SpanData, SpanError, Tracer};
pub use types::{MeasureValue, NumericKind, SpanId, Time};
