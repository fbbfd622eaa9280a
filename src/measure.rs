//! Measures: named, dimensioned instruments and their recording paths.
//!
//! A [`Measure`] is defined once through a [`MeasureBuilder`] obtained
//! from a [`Recorder`](crate::recorder::Recorder). Definition is validated
//! eagerly: a bad name, label declaration, or aggregation set fails the
//! build and registers nothing. Recording is validated synchronously: an
//! arity, kind, or value error is returned to the caller and the target
//! series is left untouched.
//!
//! The measure model is a single generic one. The numeric domain is a
//! [`NumericKind`] attribute, not a type family; one builder and one
//! record path serve both integers and floats.

use crate::aggregation::{AggregationKind, AggregationSet, BucketLayout};
use crate::clock::TimeSource;
use crate::context::Context;
use crate::label::{LabelKey, LabelSet, LabelValue};
use crate::recorder::{Recorder, ValidationPolicy};
use crate::series::{Exemplar, SeriesCell, SeriesRegistry, SeriesSnapshot};
use crate::types::{MeasureValue, NumericKind};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Maximum length of a measure name or label key, in bytes.
pub const NAME_MAX_LEN: usize = 255;

/// Errors raised while defining a measure.
///
/// These are configuration errors: they fail fast at build time and are
/// never retried. A failed build registers nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    /// The name is empty, longer than [`NAME_MAX_LEN`] bytes, or contains
    /// characters outside printable ASCII.
    #[error("invalid measure name: {0}")]
    InvalidName(String),
    /// A label key failed validation under the active policy.
    #[error("invalid label key {key:?}: {reason}")]
    InvalidLabelKey {
        /// The offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The same label key appears twice in the declaration.
    #[error("duplicate label key {0:?}")]
    DuplicateLabelKey(String),
    /// The aggregation set is empty.
    #[error("measure must declare at least one aggregation")]
    EmptyAggregations,
    /// A measure with this name exists with a different configuration.
    #[error("measure {0:?} already registered with a different configuration")]
    Redefinition(String),
}

/// Errors raised while recording a sample.
///
/// These are usage errors, surfaced synchronously to the caller. A failed
/// record leaves the target series unchanged and creates no new series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The label set arity does not match the measure declaration.
    #[error("label arity mismatch: measure declares {expected}, got {actual}")]
    ArityMismatch {
        /// Arity the measure declares.
        expected: usize,
        /// Arity the caller supplied.
        actual: usize,
    },
    /// The value kind does not match the measure's numeric kind.
    #[error("value kind mismatch: measure is {expected}, got {actual}")]
    TypeMismatch {
        /// Kind the measure declares.
        expected: NumericKind,
        /// Kind of the supplied value.
        actual: NumericKind,
    },
    /// Negative values are rejected unless the measure opts in.
    #[error("negative value rejected")]
    NegativeValue,
    /// NaN and infinite values are never accepted.
    #[error("non-finite value rejected")]
    NonFiniteValue,
}

fn name_defect(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("empty");
    }
    if name.len() > NAME_MAX_LEN {
        return Some("longer than 255 bytes");
    }
    if !name.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Some("contains non-printable characters");
    }
    None
}

fn validate_name(name: &str) -> Result<(), MeasureError> {
    match name_defect(name) {
        Some(reason) => Err(MeasureError::InvalidName(reason.to_owned())),
        None => Ok(()),
    }
}

fn validate_label_keys(keys: &[LabelKey], policy: ValidationPolicy) -> Result<(), MeasureError> {
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            return Err(MeasureError::DuplicateLabelKey(key.as_str().to_owned()));
        }
        if policy == ValidationPolicy::NamesAndKeys {
            if let Some(reason) = name_defect(key.as_str()) {
                return Err(MeasureError::InvalidLabelKey {
                    key: key.as_str().to_owned(),
                    reason: reason.to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// The immutable definition of a measure.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MeasureSpec {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) unit: String,
    pub(crate) kind: NumericKind,
    pub(crate) label_keys: Vec<LabelKey>,
    pub(crate) aggregations: AggregationSet,
    pub(crate) buckets: BucketLayout,
    pub(crate) allow_negative: bool,
}

struct MeasureInner {
    spec: MeasureSpec,
    registry: SeriesRegistry,
    clock: Arc<dyn TimeSource>,
    enabled: bool,
}

/// A named, dimensioned instrument.
///
/// Cloning is cheap; clones share the definition and the series registry.
/// Obtained from [`MeasureBuilder::build`]; there is no way to construct
/// one without going through validation.
#[derive(Clone)]
pub struct Measure {
    inner: Arc<MeasureInner>,
}

impl Measure {
    pub(crate) fn from_spec(spec: MeasureSpec, clock: Arc<dyn TimeSource>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(MeasureInner {
                spec,
                registry: SeriesRegistry::new(),
                clock,
                enabled,
            }),
        }
    }

    pub(crate) fn spec_matches(&self, other: &MeasureSpec) -> bool {
        self.inner.spec == *other
    }

    /// Returns the measure name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.inner.spec.description
    }

    /// Returns the unit string.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.inner.spec.unit
    }

    /// Returns the numeric kind this measure accepts.
    #[must_use]
    pub fn kind(&self) -> NumericKind {
        self.inner.spec.kind
    }

    /// Returns the declared label keys, in order.
    #[must_use]
    pub fn label_keys(&self) -> &[LabelKey] {
        &self.inner.spec.label_keys
    }

    /// Returns the attached aggregations.
    #[must_use]
    pub fn aggregations(&self) -> &AggregationSet {
        &self.inner.spec.aggregations
    }

    /// Returns the declared arity.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.inner.spec.label_keys.len()
    }

    /// Returns true if negative values are accepted.
    #[must_use]
    pub fn allows_negative(&self) -> bool {
        self.inner.spec.allow_negative
    }

    /// Returns the number of live sub-series.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns the sub-series for `labels`, creating it if absent.
    ///
    /// Get-or-create is atomic per label set: exactly one sub-series ever
    /// exists for a given set, however many threads race here.
    pub fn series(&self, labels: &LabelSet) -> Result<SubSeries, RecordError> {
        self.check_arity(labels)?;
        Ok(self.series_unchecked(labels))
    }

    /// Returns the sub-series whose dimensions are all unset.
    #[must_use]
    pub fn default_series(&self) -> SubSeries {
        self.series_unchecked(&LabelSet::unset(self.arity()))
    }

    /// Returns the sub-series addressed by this context's baggage.
    ///
    /// Each declared label key is looked up in the baggage; a missing key
    /// contributes the empty value.
    #[must_use]
    pub fn tagged_series(&self, context: &Context) -> SubSeries {
        let labels: LabelSet = self
            .inner
            .spec
            .label_keys
            .iter()
            .map(|key| {
                context
                    .baggage(key.as_str())
                    .map_or_else(LabelValue::empty, LabelValue::new)
            })
            .collect();
        self.series_unchecked(&labels)
    }

    /// Records one sample against `labels` under the current context.
    pub fn record(
        &self,
        labels: &LabelSet,
        value: impl Into<MeasureValue>,
    ) -> Result<(), RecordError> {
        self.record_in(labels, value, &Context::current(), None)
    }

    /// Records one sample against `labels` under an explicit context.
    ///
    /// When the context carries an active span, or `attachment` is given,
    /// the sample also produces an exemplar on the series.
    pub fn record_in(
        &self,
        labels: &LabelSet,
        value: impl Into<MeasureValue>,
        context: &Context,
        attachment: Option<&str>,
    ) -> Result<(), RecordError> {
        let value = self.check_value(value.into())?;
        self.check_arity(labels)?;
        self.series_unchecked(labels)
            .apply_validated(value, context, attachment);
        Ok(())
    }

    /// Records one sample against the series addressed by this context's
    /// baggage.
    pub fn record_tagged(
        &self,
        value: impl Into<MeasureValue>,
        context: &Context,
        attachment: Option<&str>,
    ) -> Result<(), RecordError> {
        let value = self.check_value(value.into())?;
        self.tagged_series(context)
            .apply_validated(value, context, attachment);
        Ok(())
    }

    /// Validates a value into a [`Measurement`] for batch recording.
    pub fn measurement(&self, value: impl Into<MeasureValue>) -> Result<Measurement, RecordError> {
        let value = self.check_value(value.into())?;
        Ok(Measurement {
            measure: self.clone(),
            value,
        })
    }

    /// Removes the sub-series for `labels`. Returns true if one existed.
    pub fn remove_series(&self, labels: &LabelSet) -> bool {
        self.inner.registry.remove(labels)
    }

    /// Removes every sub-series of this measure.
    pub fn clear_series(&self) {
        self.inner.registry.clear();
    }

    /// Takes a snapshot of the definition and every live sub-series.
    #[must_use]
    pub fn snapshot(&self) -> MeasureSnapshot {
        let spec = &self.inner.spec;
        MeasureSnapshot {
            name: spec.name.clone(),
            kind: spec.kind,
            unit: spec.unit.clone(),
            description: spec.description.clone(),
            label_keys: spec.label_keys.clone(),
            series: self
                .inner
                .registry
                .cells()
                .iter()
                .map(|cell| cell.snapshot(&spec.aggregations))
                .collect(),
        }
    }

    fn check_arity(&self, labels: &LabelSet) -> Result<(), RecordError> {
        if labels.len() == self.arity() {
            Ok(())
        } else {
            Err(RecordError::ArityMismatch {
                expected: self.arity(),
                actual: labels.len(),
            })
        }
    }

    fn check_value(&self, value: MeasureValue) -> Result<MeasureValue, RecordError> {
        let spec = &self.inner.spec;
        if value.kind() != spec.kind {
            return Err(RecordError::TypeMismatch {
                expected: spec.kind,
                actual: value.kind(),
            });
        }
        if !value.is_finite() {
            return Err(RecordError::NonFiniteValue);
        }
        if !spec.allow_negative && value.is_negative() {
            return Err(RecordError::NegativeValue);
        }
        Ok(value)
    }

    fn new_cell(&self, labels: LabelSet) -> SeriesCell {
        let spec = &self.inner.spec;
        let histogram = spec
            .aggregations
            .contains(AggregationKind::Distribution)
            .then(|| spec.buckets.clone());
        SeriesCell::new(labels, spec.kind, histogram)
    }

    fn series_unchecked(&self, labels: &LabelSet) -> SubSeries {
        // Disabled measures hand out detached cells: same surface, no
        // retained state.
        if !self.inner.enabled {
            return SubSeries {
                measure: self.clone(),
                cell: Arc::new(self.new_cell(labels.clone())),
            };
        }
        let (cell, created) = self.inner.registry.get_or_create(labels, |l| self.new_cell(l));
        if created {
            #[cfg(feature = "tracing-integration")]
            tracing::debug!(
                measure = %self.inner.spec.name,
                labels = %cell.labels(),
                "sub-series created"
            );
        }
        SubSeries {
            measure: self.clone(),
            cell,
        }
    }
}

impl fmt::Debug for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measure")
            .field("name", &self.inner.spec.name)
            .field("kind", &self.inner.spec.kind)
            .field("arity", &self.arity())
            .field("series", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

/// A handle on one sub-series.
///
/// Cheap to clone; all clones share the same state. Holding the handle
/// skips the registry lookup on the hot path.
#[derive(Debug, Clone)]
pub struct SubSeries {
    measure: Measure,
    cell: Arc<SeriesCell>,
}

impl SubSeries {
    /// Returns the owning measure.
    #[must_use]
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Returns the label values addressing this series.
    #[must_use]
    pub fn labels(&self) -> &LabelSet {
        self.cell.labels()
    }

    /// Records one sample under the current context.
    pub fn record(&self, value: impl Into<MeasureValue>) -> Result<(), RecordError> {
        self.record_in(value, &Context::current(), None)
    }

    /// Records one sample under an explicit context.
    pub fn record_in(
        &self,
        value: impl Into<MeasureValue>,
        context: &Context,
        attachment: Option<&str>,
    ) -> Result<(), RecordError> {
        let value = self.measure.check_value(value.into())?;
        self.apply_validated(value, context, attachment);
        Ok(())
    }

    /// Takes a consistent snapshot of this series.
    #[must_use]
    pub fn snapshot(&self) -> SeriesSnapshot {
        self.cell.snapshot(&self.measure.inner.spec.aggregations)
    }

    /// Applies a value that already passed `check_value`.
    pub(crate) fn apply_validated(
        &self,
        value: MeasureValue,
        context: &Context,
        attachment: Option<&str>,
    ) {
        if !self.measure.inner.enabled {
            return;
        }
        let span_id = context.active_span_id();
        let exemplar = if span_id.is_some() || attachment.is_some() {
            Some(Exemplar {
                value,
                span_id,
                attachment: attachment.map(ToOwned::to_owned),
                at: self.measure.inner.clock.now(),
            })
        } else {
            None
        };
        self.cell.apply(value, exemplar);
    }
}

/// A pre-validated (measure, value) pair.
///
/// Built by [`Measure::measurement`], which performs the kind and value
/// checks up front. A batch of measurements therefore cannot fail halfway
/// through being applied.
#[derive(Debug, Clone)]
pub struct Measurement {
    measure: Measure,
    value: MeasureValue,
}

impl Measurement {
    /// Returns the measure this value belongs to.
    #[must_use]
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Returns the validated value.
    #[must_use]
    pub fn value(&self) -> MeasureValue {
        self.value
    }
}

/// A snapshot of a measure's definition and all its live series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSnapshot {
    /// The measure name.
    pub name: String,
    /// The numeric kind.
    pub kind: NumericKind,
    /// The unit string.
    pub unit: String,
    /// The description.
    pub description: String,
    /// Declared label keys, in order.
    pub label_keys: Vec<LabelKey>,
    /// One snapshot per live sub-series, sorted by label set.
    pub series: Vec<SeriesSnapshot>,
}

/// Builder for a [`Measure`].
///
/// Created by [`Recorder::measure`](crate::recorder::Recorder::measure).
/// Defaults: unit `"1"`, empty description, integer kind, no labels, sum
/// and count aggregation, the recorder's default bucket layout, negative
/// values rejected.
#[derive(Debug)]
#[must_use = "call build() to validate and register the measure"]
pub struct MeasureBuilder {
    recorder: Recorder,
    name: String,
    description: String,
    unit: String,
    kind: NumericKind,
    label_keys: Vec<LabelKey>,
    aggregations: AggregationSet,
    buckets: Option<BucketLayout>,
    allow_negative: bool,
}

impl MeasureBuilder {
    pub(crate) fn new(recorder: Recorder, name: String) -> Self {
        Self {
            recorder,
            name,
            description: String::new(),
            unit: "1".to_owned(),
            kind: NumericKind::Integer,
            label_keys: Vec::new(),
            aggregations: AggregationSet::sum_and_count(),
            buckets: None,
            allow_negative: false,
        }
    }

    /// Sets the human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the unit string.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Sets the numeric kind.
    pub fn with_kind(mut self, kind: NumericKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares the ordered label keys.
    pub fn with_label_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<LabelKey>,
    {
        self.label_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the attached aggregations.
    pub fn with_aggregations(mut self, aggregations: AggregationSet) -> Self {
        self.aggregations = aggregations;
        self
    }

    /// Sets the bucket layout used by distribution aggregation.
    pub fn with_buckets(mut self, buckets: BucketLayout) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Allows strictly negative values to be recorded.
    pub fn with_allow_negative(mut self, allow: bool) -> Self {
        self.allow_negative = allow;
        self
    }

    /// Validates the definition and registers it with the recorder.
    ///
    /// Returns the existing measure if one with this name and an identical
    /// configuration is already registered; fails with
    /// [`MeasureError::Redefinition`] if the configuration differs.
    pub fn build(self) -> Result<Measure, MeasureError> {
        let Self {
            recorder,
            name,
            description,
            unit,
            kind,
            label_keys,
            aggregations,
            buckets,
            allow_negative,
        } = self;

        validate_name(&name)?;
        validate_label_keys(&label_keys, recorder.validation_policy())?;
        if aggregations.is_empty() {
            return Err(MeasureError::EmptyAggregations);
        }

        let spec = MeasureSpec {
            name,
            description,
            unit,
            kind,
            label_keys,
            aggregations,
            buckets: buckets.unwrap_or_else(|| recorder.default_buckets()),
            allow_negative,
        };
        recorder.intern(spec)
    }
}
