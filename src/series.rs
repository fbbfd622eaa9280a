//! Per-label-set aggregation state and the concurrent series registry.
//!
//! Every (measure, label set) pair owns exactly one [`SeriesCell`]. The
//! registry's get-or-create is atomic per key: concurrent callers racing
//! on a new label set all observe the same winning cell. All of a cell's
//! aggregation state sits behind one mutex, so a record call is applied
//! to every attached policy as a single event and a snapshot is always
//! internally consistent.

use crate::aggregation::{AggregationKind, AggregationSet, BucketLayout};
use crate::label::{LabelSet, LabelValue};
use crate::types::{MeasureValue, NumericKind, SpanId, Time};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// An exemplar captured alongside an aggregated sample.
///
/// Recorded when a sample carries an active span or an explicit
/// attachment. Only the most recent exemplar is kept per series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    /// The sample value the exemplar was taken from.
    pub value: MeasureValue,
    /// The span active when the sample was recorded, if any.
    pub span_id: Option<SpanId>,
    /// The attachment supplied with the sample, if any.
    pub attachment: Option<String>,
    /// When the sample was recorded.
    pub at: Time,
}

/// A point-in-time view of one sub-series.
///
/// Fields are populated for the aggregations the measure declares and
/// `None` otherwise. Taken under the series mutex, so the fields are
/// mutually consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    /// The label values addressing this series, in declaration order.
    pub labels: Vec<LabelValue>,
    /// Running sum, when sum aggregation is attached.
    pub sum: Option<MeasureValue>,
    /// Sample count, when count aggregation is attached.
    pub count: Option<u64>,
    /// Most recent value, when last-value aggregation is attached and at
    /// least one sample was recorded.
    pub last: Option<MeasureValue>,
    /// Bucketed distribution, when distribution aggregation is attached.
    pub distribution: Option<DistributionSnapshot>,
    /// The most recent exemplar, if any sample carried one.
    pub exemplar: Option<Exemplar>,
}

/// Bucketed view of a distribution aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    /// Upper bounds in ascending order.
    pub bounds: Vec<f64>,
    /// Counts per bucket; the final entry is the overflow bucket.
    pub counts: Vec<u64>,
    /// Sum of all observed values, widened to `f64`.
    pub sum: f64,
    /// Total number of observations.
    pub count: u64,
}

#[derive(Debug, Clone, Copy)]
enum SumState {
    Integer(i64),
    Float(f64),
}

impl SumState {
    fn new(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Integer => Self::Integer(0),
            NumericKind::Float => Self::Float(0.0),
        }
    }

    fn add(&mut self, value: MeasureValue) {
        // Kind mismatches are rejected before apply.
        match (self, value) {
            (Self::Integer(acc), MeasureValue::Integer(v)) => *acc = acc.saturating_add(v),
            (Self::Float(acc), MeasureValue::Float(v)) => *acc += v,
            _ => {}
        }
    }

    fn value(self) -> MeasureValue {
        match self {
            Self::Integer(acc) => MeasureValue::Integer(acc),
            Self::Float(acc) => MeasureValue::Float(acc),
        }
    }
}

#[derive(Debug, Clone)]
struct HistogramState {
    layout: BucketLayout,
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramState {
    fn new(layout: BucketLayout) -> Self {
        let counts = vec![0; layout.bucket_count()];
        Self {
            layout,
            counts,
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        let index = self.layout.bucket_index(value);
        self.counts[index] += 1;
    }

    fn snapshot(&self) -> DistributionSnapshot {
        DistributionSnapshot {
            bounds: self.layout.bounds().to_vec(),
            counts: self.counts.clone(),
            sum: self.sum,
            count: self.count,
        }
    }
}

#[derive(Debug)]
struct SeriesState {
    sum: SumState,
    count: u64,
    last: Option<MeasureValue>,
    histogram: Option<HistogramState>,
    exemplar: Option<Exemplar>,
}

/// One sub-series: the aggregation state for a single (measure, label set).
#[derive(Debug)]
pub(crate) struct SeriesCell {
    labels: LabelSet,
    state: Mutex<SeriesState>,
}

impl SeriesCell {
    pub(crate) fn new(
        labels: LabelSet,
        kind: NumericKind,
        histogram: Option<BucketLayout>,
    ) -> Self {
        Self {
            labels,
            state: Mutex::new(SeriesState {
                sum: SumState::new(kind),
                count: 0,
                last: None,
                histogram: histogram.map(HistogramState::new),
                exemplar: None,
            }),
        }
    }

    pub(crate) fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Applies one validated sample to every tracked aggregation.
    pub(crate) fn apply(&self, value: MeasureValue, exemplar: Option<Exemplar>) {
        let mut state = self.state.lock();
        state.sum.add(value);
        state.count += 1;
        state.last = Some(value);
        if let Some(histogram) = state.histogram.as_mut() {
            histogram.observe(value.as_f64());
        }
        if exemplar.is_some() {
            state.exemplar = exemplar;
        }
    }

    pub(crate) fn snapshot(&self, aggregations: &AggregationSet) -> SeriesSnapshot {
        let state = self.state.lock();
        SeriesSnapshot {
            labels: self.labels.to_vec(),
            sum: aggregations
                .contains(AggregationKind::Sum)
                .then(|| state.sum.value()),
            count: aggregations
                .contains(AggregationKind::Count)
                .then_some(state.count),
            last: if aggregations.contains(AggregationKind::LastValue) {
                state.last
            } else {
                None
            },
            distribution: state.histogram.as_ref().map(HistogramState::snapshot),
            exemplar: state.exemplar.clone(),
        }
    }
}

/// Concurrent label-set to series map with atomic get-or-create.
#[derive(Debug, Default)]
pub(crate) struct SeriesRegistry {
    cells: RwLock<HashMap<LabelSet, Arc<SeriesCell>>>,
}

impl SeriesRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the cell for `labels`, creating it if absent.
    ///
    /// The second element is true when this call created the cell. Losers
    /// of a creation race observe and return the winner's cell.
    pub(crate) fn get_or_create(
        &self,
        labels: &LabelSet,
        init: impl FnOnce(LabelSet) -> SeriesCell,
    ) -> (Arc<SeriesCell>, bool) {
        if let Some(cell) = self.cells.read().get(labels) {
            return (Arc::clone(cell), false);
        }
        let mut cells = self.cells.write();
        match cells.entry(labels.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let cell = Arc::new(init(labels.clone()));
                entry.insert(Arc::clone(&cell));
                (cell, true)
            }
        }
    }

    pub(crate) fn get(&self, labels: &LabelSet) -> Option<Arc<SeriesCell>> {
        self.cells.read().get(labels).map(Arc::clone)
    }

    /// Removes the cell for `labels`. Returns true if one was present.
    pub(crate) fn remove(&self, labels: &LabelSet) -> bool {
        self.cells.write().remove(labels).is_some()
    }

    /// Removes every cell.
    pub(crate) fn clear(&self) {
        self.cells.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// Returns the live cells, sorted by label set.
    pub(crate) fn cells(&self) -> Vec<Arc<SeriesCell>> {
        let mut cells: Vec<Arc<SeriesCell>> = self.cells.read().values().map(Arc::clone).collect();
        cells.sort_by(|a, b| a.labels().cmp(b.labels()));
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: NumericKind) -> SeriesCell {
        SeriesCell::new(LabelSet::from_values(["a"]), kind, None)
    }

    fn all_kinds() -> AggregationSet {
        AggregationSet::new([
            AggregationKind::Sum,
            AggregationKind::Count,
            AggregationKind::LastValue,
        ])
    }

    // ---- SeriesCell ----

    #[test]
    fn apply_updates_sum_count_last() {
        let cell = cell(NumericKind::Integer);
        for v in [1, 2, 3, 4] {
            cell.apply(MeasureValue::Integer(v), None);
        }
        let snap = cell.snapshot(&all_kinds());
        assert_eq!(snap.sum, Some(MeasureValue::Integer(10)));
        assert_eq!(snap.count, Some(4));
        assert_eq!(snap.last, Some(MeasureValue::Integer(4)));
        assert!(snap.distribution.is_none());
        assert!(snap.exemplar.is_none());
    }

    #[test]
    fn integer_sum_saturates() {
        let cell = cell(NumericKind::Integer);
        cell.apply(MeasureValue::Integer(i64::MAX), None);
        cell.apply(MeasureValue::Integer(i64::MAX), None);
        let snap = cell.snapshot(&all_kinds());
        assert_eq!(snap.sum, Some(MeasureValue::Integer(i64::MAX)));
        assert_eq!(snap.count, Some(2));
    }

    #[test]
    fn float_sum_accumulates() {
        let cell = cell(NumericKind::Float);
        cell.apply(MeasureValue::Float(1.5), None);
        cell.apply(MeasureValue::Float(2.25), None);
        let snap = cell.snapshot(&all_kinds());
        assert_eq!(snap.sum, Some(MeasureValue::Float(3.75)));
        assert_eq!(snap.last, Some(MeasureValue::Float(2.25)));
    }

    #[test]
    fn snapshot_filters_to_declared_aggregations() {
        let cell = cell(NumericKind::Integer);
        cell.apply(MeasureValue::Integer(5), None);

        let count_only = cell.snapshot(&AggregationSet::new([AggregationKind::Count]));
        assert_eq!(count_only.count, Some(1));
        assert!(count_only.sum.is_none());
        assert!(count_only.last.is_none());
    }

    #[test]
    fn histogram_buckets_observations() {
        let layout = BucketLayout::explicit(vec![10.0, 50.0, 100.0]);
        let cell = SeriesCell::new(
            LabelSet::from_values(["a"]),
            NumericKind::Float,
            Some(layout),
        );
        for v in [5.0, 25.0, 75.0, 200.0] {
            cell.apply(MeasureValue::Float(v), None);
        }
        let snap = cell.snapshot(&AggregationSet::new([AggregationKind::Distribution]));
        let dist = snap.distribution.unwrap();
        assert_eq!(dist.counts, vec![1, 1, 1, 1]);
        assert_eq!(dist.count, 4);
        assert!((dist.sum - 305.0).abs() < 1e-9);
    }

    #[test]
    fn exemplar_last_write_wins() {
        let cell = cell(NumericKind::Integer);
        let first = Exemplar {
            value: MeasureValue::Integer(1),
            span_id: Some(SpanId::from_raw(10)),
            attachment: None,
            at: Time::from_millis(1),
        };
        let second = Exemplar {
            value: MeasureValue::Integer(2),
            span_id: None,
            attachment: Some("trace-b".to_owned()),
            at: Time::from_millis(2),
        };
        cell.apply(MeasureValue::Integer(1), Some(first));
        cell.apply(MeasureValue::Integer(2), Some(second.clone()));
        cell.apply(MeasureValue::Integer(3), None);

        let snap = cell.snapshot(&all_kinds());
        assert_eq!(snap.exemplar, Some(second));
    }

    // ---- SeriesRegistry ----

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = SeriesRegistry::new();
        let labels = LabelSet::from_values(["x"]);
        let (first, created_first) = registry.get_or_create(&labels, |l| {
            SeriesCell::new(l, NumericKind::Integer, None)
        });
        let (second, created_second) = registry.get_or_create(&labels, |l| {
            SeriesCell::new(l, NumericKind::Integer, None)
        });
        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let registry = SeriesRegistry::new();
        let a = LabelSet::from_values(["a"]);
        let b = LabelSet::from_values(["b"]);
        registry.get_or_create(&a, |l| SeriesCell::new(l, NumericKind::Integer, None));
        registry.get_or_create(&b, |l| SeriesCell::new(l, NumericKind::Integer, None));

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&b).is_some());

        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(registry.get(&b).is_none());
    }

    #[test]
    fn cells_sorted_by_labels() {
        let registry = SeriesRegistry::new();
        for name in ["c", "a", "b"] {
            registry.get_or_create(&LabelSet::from_values([name]), |l| {
                SeriesCell::new(l, NumericKind::Integer, None)
            });
        }
        let names: Vec<String> = registry
            .cells()
            .iter()
            .map(|c| c.labels().to_string())
            .collect();
        assert_eq!(names, ["{a}", "{b}", "{c}"]);
    }

    #[test]
    fn removed_series_state_not_resurrected() {
        let registry = SeriesRegistry::new();
        let labels = LabelSet::from_values(["x"]);
        let (cell, _) =
            registry.get_or_create(&labels, |l| SeriesCell::new(l, NumericKind::Integer, None));
        cell.apply(MeasureValue::Integer(9), None);
        registry.remove(&labels);

        let (fresh, created) =
            registry.get_or_create(&labels, |l| SeriesCell::new(l, NumericKind::Integer, None));
        assert!(created);
        let snap = fresh.snapshot(&AggregationSet::sum_and_count());
        assert_eq!(snap.count, Some(0));
        assert_eq!(snap.sum, Some(MeasureValue::Integer(0)));
    }
}
