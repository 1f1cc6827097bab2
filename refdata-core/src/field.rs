//! Field values and per-field cache state.
//!
//! An identifier's reference data is an ordered multi-map: the same field
//! name may legitimately appear several times (ticker aliases, bulk fields),
//! and the order of those repeated values carries meaning.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single upstream value. Upstream data is heterogeneous (prices, strings,
/// nested bulk structures), so values are kept as JSON.
pub type FieldValue = serde_json::Value;

/// Insertion-ordered multi-map from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues {
    entries: Vec<(String, FieldValue)>,
}

impl FieldValues {
    /// Create an empty multi-map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value. Existing values under the same name are kept.
    pub fn add(&mut self, field: impl Into<String>, value: FieldValue) {
        self.entries.push((field.into(), value));
    }

    /// All values stored under `field`, in insertion order.
    pub fn get_all(&self, field: &str) -> impl Iterator<Item = &FieldValue> + '_ {
        let field = field.to_owned();
        self.entries
            .iter()
            .filter(move |(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// The first value stored under `field`.
    pub fn first(&self, field: &str) -> Option<&FieldValue> {
        self.get_all(field).next()
    }

    /// Whether at least one value is stored under `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == field)
    }

    /// Distinct field names present.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Remove every value stored under `field`, returning how many were removed.
    pub fn remove_field(&mut self, field: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(name, _)| name != field);
        before - self.entries.len()
    }

    /// Copy of this map restricted to `fields`, order preserved.
    pub fn retain_fields(&self, fields: &BTreeSet<String>) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(name, _)| fields.contains(name))
                .cloned()
                .collect(),
        }
    }

    /// Iterate `(field, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of stored values (repeated names counted individually).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order-independent equality.
    ///
    /// The relative order of distinct field names is ignored; the order of
    /// repeated values under one name is significant.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.len() == other.len() && self.grouped() == other.grouped()
    }

    fn grouped(&self) -> BTreeMap<&str, Vec<&FieldValue>> {
        let mut grouped: BTreeMap<&str, Vec<&FieldValue>> = BTreeMap::new();
        for (name, value) in &self.entries {
            grouped.entry(name.as_str()).or_default().push(value);
        }
        grouped
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FieldValues {
    type Item = &'a (String, FieldValue);
    type IntoIter = std::slice::Iter<'a, (String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Cache state of one field for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSlot<'a> {
    /// The upstream returned these values (at least one).
    Resolved(Vec<&'a FieldValue>),
    /// The upstream confirmed the field does not exist for the identifier.
    KnownUnavailable,
    /// Never queried.
    Unknown,
}

impl FieldSlot<'_> {
    /// Whether the field needs no further upstream query.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}
