//! Core value types shared across the crate.
//!
//! These are plain data: a nanosecond timestamp, a process-unique span
//! identifier, and the tagged numeric value a measure accepts. Everything
//! here is `Copy`, serializable, and free of interior state.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A logical timestamp in nanoseconds.
///
/// Produced by a [`TimeSource`](crate::clock::TimeSource): wall-clock time
/// in production, manually advanced time in tests. All arithmetic saturates
/// rather than wrapping.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Time(u64);

impl Time {
    /// The zero instant (epoch).
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a new time from nanoseconds since epoch.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a new time from milliseconds since epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a new time from seconds since epoch.
    #[inline]
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the time as nanoseconds since epoch.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds since epoch (truncated).
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns the time as seconds since epoch (truncated).
    #[inline]
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Adds a duration in nanoseconds, saturating on overflow.
    #[inline]
    #[must_use]
    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Subtracts a duration in nanoseconds, saturating at zero.
    #[inline]
    #[must_use]
    pub const fn saturating_sub_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_sub(nanos))
    }

    /// Returns the duration between two times in nanoseconds.
    ///
    /// Returns 0 if `self` is before `earlier`.
    #[inline]
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        self.saturating_add_nanos(nanos)
    }
}

impl fmt::Debug for Time {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(
                f,
                "{}.{:03}s",
                self.0 / 1_000_000_000,
                (self.0 / 1_000_000) % 1000
            )
        } else if self.0 >= 1_000_000 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else if self.0 >= 1_000 {
            write!(f, "{}us", self.0 / 1_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

/// A unique identifier for a span within this process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpanId(u64);

impl SpanId {
    /// Generates a new monotonically increasing span ID.
    #[must_use]
    pub fn new() -> Self {
        // Deterministic sequence keeps replays stable and avoids ambient RNG.
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a span ID from a raw value (tests and replay tooling).
    #[doc(hidden)]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpanId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.0)
    }
}

impl fmt::Display for SpanId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// The numeric domain of a measure.
///
/// A measure accepts values of exactly one kind; recording the other kind
/// is a [`RecordError::TypeMismatch`](crate::measure::RecordError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    /// 64-bit signed integer samples.
    Integer,
    /// 64-bit floating point samples.
    Float,
}

impl NumericKind {
    /// Returns the kind name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sample value, tagged with its numeric kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MeasureValue {
    /// An integer sample.
    Integer(i64),
    /// A floating point sample.
    Float(f64),
}

impl MeasureValue {
    /// Returns the numeric kind of this value.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> NumericKind {
        match self {
            Self::Integer(_) => NumericKind::Integer,
            Self::Float(_) => NumericKind::Float,
        }
    }

    /// Returns the value widened to `f64`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Returns true if the value is strictly negative.
    #[inline]
    #[must_use]
    pub fn is_negative(self) -> bool {
        match self {
            Self::Integer(v) => v < 0,
            Self::Float(v) => v < 0.0,
        }
    }

    /// Returns true if the value is finite. Integers always are; floats
    /// exclude NaN and the infinities.
    #[inline]
    #[must_use]
    pub fn is_finite(self) -> bool {
        match self {
            Self::Integer(_) => true,
            Self::Float(v) => v.is_finite(),
        }
    }
}

impl From<i64> for MeasureValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MeasureValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for MeasureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Time ----

    #[test]
    fn time_constructors() {
        assert_eq!(Time::from_nanos(1).as_nanos(), 1);
        assert_eq!(Time::from_millis(1).as_nanos(), 1_000_000);
        assert_eq!(Time::from_secs(1).as_nanos(), 1_000_000_000);
        assert_eq!(Time::from_nanos(1_500_000_000).as_secs(), 1);
        assert_eq!(Time::from_nanos(1_500_000_000).as_millis(), 1500);
    }

    #[test]
    fn time_saturating_arithmetic() {
        let t = Time::from_nanos(100);
        assert_eq!(t.saturating_add_nanos(50).as_nanos(), 150);
        assert_eq!(t.saturating_sub_nanos(200), Time::ZERO);
        assert_eq!(Time::MAX.saturating_add_nanos(1), Time::MAX);
        assert_eq!(Time::from_secs(u64::MAX), Time::MAX);
    }

    #[test]
    fn time_duration_since() {
        let t1 = Time::from_millis(10);
        let t2 = Time::from_millis(25);
        assert_eq!(t2.duration_since(t1), 15_000_000);
        assert_eq!(t1.duration_since(t2), 0);
    }

    #[test]
    fn time_add_duration() {
        let t = Time::from_secs(1) + Duration::from_millis(500);
        assert_eq!(t.as_millis(), 1500);
    }

    #[test]
    fn time_display_scales_units() {
        assert_eq!(Time::from_nanos(42).to_string(), "42ns");
        assert_eq!(Time::from_nanos(5_000).to_string(), "5us");
        assert_eq!(Time::from_nanos(3_000_000).to_string(), "3ms");
        assert_eq!(Time::from_nanos(1_234_000_000).to_string(), "1.234s");
    }

    // ---- SpanId ----

    #[test]
    fn span_id_unique_and_increasing() {
        let a = SpanId::new();
        let b = SpanId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn span_id_display_forms() {
        let s = SpanId::from_raw(99);
        assert_eq!(s.to_string(), "S99");
        assert_eq!(format!("{s:?}"), "SpanId(99)");
    }

    // ---- MeasureValue ----

    #[test]
    fn value_kind_tagging() {
        assert_eq!(MeasureValue::from(7i64).kind(), NumericKind::Integer);
        assert_eq!(MeasureValue::from(7.5f64).kind(), NumericKind::Float);
    }

    #[test]
    fn value_negativity() {
        assert!(MeasureValue::Integer(-1).is_negative());
        assert!(MeasureValue::Float(-0.5).is_negative());
        assert!(!MeasureValue::Integer(0).is_negative());
        assert!(!MeasureValue::Float(0.0).is_negative());
    }

    #[test]
    fn value_finiteness() {
        assert!(MeasureValue::Integer(i64::MIN).is_finite());
        assert!(MeasureValue::Float(1.0).is_finite());
        assert!(!MeasureValue::Float(f64::NAN).is_finite());
        assert!(!MeasureValue::Float(f64::INFINITY).is_finite());
        assert!(!MeasureValue::Float(f64::NEG_INFINITY).is_finite());
    }

    #[test]
    fn value_widening() {
        assert_eq!(MeasureValue::Integer(4).as_f64(), 4.0);
        assert_eq!(MeasureValue::Float(4.5).as_f64(), 4.5);
    }

    #[test]
    fn kind_display() {
        assert_eq!(NumericKind::Integer.to_string(), "integer");
        assert_eq!(NumericKind::Float.to_string(), "float");
    }
}
