//! The recorder: entry point for defining measures and collecting state.
//!
//! A [`Recorder`] owns the instrument table, the validation policy, the
//! shared clock, and the default bucket layout. There is no process-wide
//! instance; construct one and pass clones where instrumentation happens.
//! Clones are cheap and share all state.
//!
//! [`Recorder::noop`] builds a disabled recorder with the same surface:
//! definitions are validated identically, but nothing is retained and
//! recording is free. Library code can take a `Recorder` unconditionally
//! and let the binary decide whether instrumentation is live.

use crate::aggregation::BucketLayout;
use crate::clock::{TimeSource, WallClock};
use crate::context::Context;
use crate::measure::{
    Measure, MeasureBuilder, MeasureError, MeasureSnapshot, MeasureSpec, Measurement,
};
use core::fmt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// How strictly measure definitions are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Only measure names are validated.
    NamesOnly,
    /// Measure names and label keys are validated.
    #[default]
    NamesAndKeys,
}

struct RecorderShared {
    measures: RwLock<HashMap<String, Measure>>,
    policy: ValidationPolicy,
    default_buckets: BucketLayout,
    clock: Arc<dyn TimeSource>,
    enabled: bool,
}

/// The instrumentation façade.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<RecorderShared>,
}

impl Recorder {
    /// Creates a live recorder with default settings.
    #[must_use]
    pub fn new() -> Self {
        RecorderBuilder::default().build()
    }

    /// Returns a builder for a recorder with custom settings.
    #[must_use]
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::default()
    }

    /// Creates a disabled recorder.
    ///
    /// Definitions validate exactly as on a live recorder, but no measure
    /// is retained, recording aggregates nothing, and [`collect`] always
    /// returns an empty vector.
    ///
    /// [`collect`]: Self::collect
    #[must_use]
    pub fn noop() -> Self {
        RecorderBuilder::default().build_disabled()
    }

    /// Returns true if this recorder discards everything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.shared.enabled
    }

    /// Returns the active validation policy.
    #[must_use]
    pub fn validation_policy(&self) -> ValidationPolicy {
        self.shared.policy
    }

    /// Starts defining a measure with the given name.
    pub fn measure(&self, name: impl Into<String>) -> MeasureBuilder {
        MeasureBuilder::new(self.clone(), name.into())
    }

    /// Returns the registered measure with this name, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Measure> {
        self.shared.measures.read().get(name).cloned()
    }

    /// Returns every registered measure, sorted by name.
    #[must_use]
    pub fn measures(&self) -> Vec<Measure> {
        let mut all: Vec<Measure> = self.shared.measures.read().values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Snapshots every registered measure and its series, sorted by name.
    #[must_use]
    pub fn collect(&self) -> Vec<MeasureSnapshot> {
        let mut snapshots: Vec<MeasureSnapshot> = self
            .shared
            .measures
            .read()
            .values()
            .map(Measure::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Records a batch of pre-validated measurements under one context.
    ///
    /// Every measurement targets the series addressed by the context's
    /// baggage, as in [`Measure::tagged_series`]. Values were validated
    /// when the measurements were built, so the batch cannot fail partway
    /// through.
    pub fn record_batch(
        &self,
        measurements: &[Measurement],
        context: &Context,
        attachment: Option<&str>,
    ) {
        for m in measurements {
            m.measure()
                .tagged_series(context)
                .apply_validated(m.value(), context, attachment);
        }
    }

    pub(crate) fn default_buckets(&self) -> BucketLayout {
        self.shared.default_buckets.clone()
    }

    pub(crate) fn intern(&self, spec: MeasureSpec) -> Result<Measure, MeasureError> {
        if !self.shared.enabled {
            // A disabled recorder keeps no table, so re-registration
            // cannot be checked and each build returns a fresh handle.
            return Ok(Measure::from_spec(
                spec,
                Arc::clone(&self.shared.clock),
                false,
            ));
        }
        let mut measures = self.shared.measures.write();
        if let Some(existing) = measures.get(&spec.name) {
            if existing.spec_matches(&spec) {
                return Ok(existing.clone());
            }
            return Err(MeasureError::Redefinition(spec.name));
        }
        let measure = Measure::from_spec(spec, Arc::clone(&self.shared.clock), true);
        #[cfg(feature = "tracing-integration")]
        tracing::debug!(measure = %measure.name(), kind = %measure.kind(), "measure registered");
        measures.insert(measure.name().to_owned(), measure.clone());
        Ok(measure)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("measures", &self.shared.measures.read().len())
            .field("policy", &self.shared.policy)
            .field("noop", &self.is_noop())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Recorder`].
///
/// Defaults: [`ValidationPolicy::NamesAndKeys`], the
/// [`BucketLayout::latency_ms`] bucket layout, and a [`WallClock`].
#[must_use = "call build() to construct the recorder"]
pub struct RecorderBuilder {
    policy: ValidationPolicy,
    default_buckets: BucketLayout,
    clock: Arc<dyn TimeSource>,
}

impl RecorderBuilder {
    /// Sets the validation policy.
    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the bucket layout used when a measure declares none.
    pub fn with_default_buckets(mut self, buckets: BucketLayout) -> Self {
        self.default_buckets = buckets;
        self
    }

    /// Sets the time source used for exemplar timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds a live recorder.
    pub fn build(self) -> Recorder {
        self.finish(true)
    }

    /// Builds a disabled recorder.
    pub fn build_disabled(self) -> Recorder {
        self.finish(false)
    }

    fn finish(self, enabled: bool) -> Recorder {
        Recorder {
            shared: Arc::new(RecorderShared {
                measures: RwLock::new(HashMap::new()),
                policy: self.policy,
                default_buckets: self.default_buckets,
                clock: self.clock,
                enabled,
            }),
        }
    }
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self {
            policy: ValidationPolicy::default(),
            default_buckets: BucketLayout::default(),
            clock: Arc::new(WallClock::new()),
        }
    }
}

impl fmt::Debug for RecorderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderBuilder")
            .field("policy", &self.policy)
            .field("default_buckets", &self.default_buckets)
            .finish_non_exhaustive()
    }
}
