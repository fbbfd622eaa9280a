//! Label keys, values, and the ordered sets that address sub-series.
//!
//! A measure declares an ordered list of [`LabelKey`]s; every recording
//! supplies a [`LabelSet`] of the same arity. Two label sets with the same
//! values in the same order address the same sub-series, so `LabelSet`
//! implements value-wise equality and hashing and is used as a map key.
//!
//! There is no "absent" label value. The empty string is a valid, present
//! value and is what unset dimensions collapse to.

use core::fmt;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A label dimension name declared by a measure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelKey(String);

impl LabelKey {
    /// Creates a new label key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LabelKey {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for LabelKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A single label value.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct LabelValue(String);

impl LabelValue {
    /// Creates a new label value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The empty value, used for unset dimensions.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Returns the value as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty value.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An ordered, fixed-arity sequence of label values.
///
/// Order is significant: `["GET", "/api"]` and `["/api", "GET"]` are
/// different sets and address different sub-series. Common arities stay
/// inline without a heap allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LabelSet {
    values: SmallVec<[LabelValue; 4]>,
}

impl LabelSet {
    /// Creates an empty label set (arity zero).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a label set from an ordered sequence of values.
    #[must_use]
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<LabelValue>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a label set of `arity` empty values.
    ///
    /// This is the default series address: every dimension present, none set.
    #[must_use]
    pub fn unset(arity: usize) -> Self {
        Self {
            values: (0..arity).map(|_| LabelValue::empty()).collect(),
        }
    }

    /// Appends a value, growing the arity by one.
    pub fn push(&mut self, value: impl Into<LabelValue>) {
        self.values.push(value.into());
    }

    /// Returns the arity of the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true for the arity-zero set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `index`, if within arity.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&LabelValue> {
        self.values.get(index)
    }

    /// Iterates over the values in order.
    pub fn iter(&self) -> core::slice::Iter<'_, LabelValue> {
        self.values.iter()
    }

    /// Copies the values into a plain vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<LabelValue> {
        self.values.to_vec()
    }
}

impl FromIterator<LabelValue> for LabelSet {
    fn from_iter<I: IntoIterator<Item = LabelValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a LabelValue;
    type IntoIter = core::slice::Iter<'a, LabelValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(value.as_str())?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn value_wise_equality() {
        let a = LabelSet::from_values(["GET", "/api"]);
        let b = LabelSet::from_values(["GET", "/api"]);
        let c = LabelSet::from_values(["POST", "/api"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn order_is_significant() {
        let a = LabelSet::from_values(["GET", "/api"]);
        let b = LabelSet::from_values(["/api", "GET"]);
        assert_ne!(a, b);
    }

    #[test]
    fn usable_as_map_key() {
        let mut map = HashMap::new();
        map.insert(LabelSet::from_values(["a", "b"]), 1);
        map.insert(LabelSet::from_values(["a", "b"]), 2);
        map.insert(LabelSet::from_values(["a", "c"]), 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&LabelSet::from_values(["a", "b"])], 2);
    }

    #[test]
    fn unset_has_requested_arity() {
        let set = LabelSet::unset(3);
        assert_eq!(set.len(), 3);
        assert!(set.iter().all(LabelValue::is_empty));
        assert_ne!(set, LabelSet::unset(2));
    }

    #[test]
    fn empty_value_is_present_not_absent() {
        let with_empty = LabelSet::from_values(["GET", ""]);
        let shorter = LabelSet::from_values(["GET"]);
        assert_eq!(with_empty.len(), 2);
        assert_ne!(with_empty, shorter);
    }

    #[test]
    fn push_grows_arity() {
        let mut set = LabelSet::new();
        set.push("a");
        set.push(LabelValue::new("b"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).map(LabelValue::as_str), Some("b"));
        assert_eq!(set.get(2), None);
    }

    #[test]
    fn display_joins_values() {
        let set = LabelSet::from_values(["GET", "/api"]);
        assert_eq!(set.to_string(), "{GET,/api}");
        assert_eq!(LabelSet::new().to_string(), "{}");
    }

    #[test]
    fn to_vec_round_trip() {
        let set = LabelSet::from_values(["x", "y"]);
        let values = set.to_vec();
        assert_eq!(set, values.into_iter().collect::<LabelSet>());
    }
}
