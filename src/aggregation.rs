//! Aggregation policies applied to recorded samples.
//!
//! A measure declares which reductions its sub-series maintain: running
//! sum, sample count, bucketed distribution, or most recent value. Bucket
//! boundaries for distributions come from a [`BucketLayout`] supplied at
//! definition time; the core does not pick layouts on its own.

use core::fmt;
use serde::{Deserialize, Serialize};

/// The reduction a sub-series applies to its stream of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationKind {
    /// Running sum. Saturates in the integer domain.
    Sum,
    /// Count of recorded samples.
    Count,
    /// Bucketed distribution over a [`BucketLayout`].
    Distribution,
    /// Most recently recorded value. No cross-thread ordering is implied;
    /// under concurrent recording some recorded value wins.
    LastValue,
}

impl AggregationKind {
    /// Returns the kind name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Distribution => "distribution",
            Self::LastValue => "last_value",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of aggregations attached to a measure.
///
/// Preserves declaration order and drops duplicates. An empty set is
/// representable here but rejected at measure definition time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSet {
    kinds: Vec<AggregationKind>,
}

impl AggregationSet {
    /// Creates a set from the given kinds, dropping duplicates.
    #[must_use]
    pub fn new(kinds: impl IntoIterator<Item = AggregationKind>) -> Self {
        let mut out = Vec::new();
        for kind in kinds {
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
        Self { kinds: out }
    }

    /// The default set: sum and count.
    #[must_use]
    pub fn sum_and_count() -> Self {
        Self::new([AggregationKind::Sum, AggregationKind::Count])
    }

    /// Returns true if the set contains `kind`.
    #[must_use]
    pub fn contains(&self, kind: AggregationKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Returns the kinds in declaration order.
    #[must_use]
    pub fn kinds(&self) -> &[AggregationKind] {
        &self.kinds
    }

    /// Returns the number of distinct kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if no kinds are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for AggregationSet {
    fn default() -> Self {
        Self::sum_and_count()
    }
}

impl FromIterator<AggregationKind> for AggregationSet {
    fn from_iter<I: IntoIterator<Item = AggregationKind>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Bucket boundaries for distribution aggregation.
///
/// Bounds are upper-inclusive and kept sorted; an implicit overflow bucket
/// catches everything above the last bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketLayout {
    bounds: Vec<f64>,
}

impl BucketLayout {
    /// Creates a layout from explicit upper bounds.
    ///
    /// Bounds are sorted and deduplicated; non-finite bounds are dropped.
    #[must_use]
    pub fn explicit(bounds: Vec<f64>) -> Self {
        let mut bounds: Vec<f64> = bounds.into_iter().filter(|b| b.is_finite()).collect();
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();
        Self { bounds }
    }

    /// Default latency layout (bounds in milliseconds).
    #[must_use]
    pub fn latency_ms() -> Self {
        Self::explicit(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
        ])
    }

    /// Creates a layout with exponentially growing bounds.
    #[must_use]
    pub fn exponential(start: f64, factor: f64, count: usize) -> Self {
        let mut bounds = Vec::with_capacity(count);
        let mut bound = start;
        for _ in 0..count {
            bounds.push(bound);
            bound *= factor;
        }
        Self::explicit(bounds)
    }

    /// Returns the upper bounds in ascending order.
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Returns the number of buckets including the overflow bucket.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bounds.len() + 1
    }

    /// Returns the index of the bucket `value` falls into.
    ///
    /// A value equal to a bound lands in that bound's bucket; a value above
    /// every bound lands in the overflow bucket.
    #[must_use]
    pub fn bucket_index(&self, value: f64) -> usize {
        for (i, &bound) in self.bounds.iter().enumerate() {
            if value <= bound {
                return i;
            }
        }
        self.bounds.len()
    }
}

impl Default for BucketLayout {
    fn default() -> Self {
        Self::latency_ms()
    }
}
