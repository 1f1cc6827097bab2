//! Grouping identifiers by the fields they still need.
//!
//! Identifiers whose outstanding field-sets are identical can be sent to the
//! upstream as one batch. Identifiers with nothing outstanding need no
//! upstream call at all.

use refdata_core::{ReferenceData, ReferenceDataRequest};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Mapping from field-set to the identifiers that need exactly those fields.
///
/// Built fresh for each request and discarded afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPartition {
    groups: BTreeMap<BTreeSet<String>, BTreeSet<String>>,
}

impl RequestPartition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition a request against what the store already holds.
    pub fn for_request(
        request: &ReferenceDataRequest,
        cached: &HashMap<String, ReferenceData>,
    ) -> Self {
        let mut partition = Self::new();
        for identifier in request.identifiers() {
            let missing = missing_fields(request.fields(), cached.get(identifier));
            partition.insert(missing, identifier.clone());
        }
        partition
    }

    /// Partition cached identifiers by the field-set currently known for
    /// them (resolved plus not-available). Uncached identifiers are left out.
    pub fn for_refresh(
        identifiers: &BTreeSet<String>,
        cached: &HashMap<String, ReferenceData>,
    ) -> Self {
        let mut partition = Self::new();
        for identifier in identifiers {
            if let Some(record) = cached.get(identifier) {
                partition.insert(record.known_fields(), identifier.clone());
            }
        }
        partition
    }

    /// Add `identifier` to the group for `fields`.
    pub fn insert(&mut self, fields: BTreeSet<String>, identifier: String) {
        self.groups.entry(fields).or_default().insert(identifier);
    }

    /// Identifiers needing no upstream query.
    pub fn satisfied(&self) -> Option<&BTreeSet<String>> {
        self.groups.get(&BTreeSet::new())
    }

    /// Groups that need an upstream query, as `(fields, identifiers)`.
    pub fn pending(&self) -> impl Iterator<Item = (&BTreeSet<String>, &BTreeSet<String>)> {
        self.groups.iter().filter(|(fields, _)| !fields.is_empty())
    }

    /// All groups, including the satisfied one.
    pub fn groups(&self) -> impl Iterator<Item = (&BTreeSet<String>, &BTreeSet<String>)> {
        self.groups.iter()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Requested fields that are neither resolved nor known to be unavailable.
pub fn missing_fields(
    requested: &BTreeSet<String>,
    cached: Option<&ReferenceData>,
) -> BTreeSet<String> {
    match cached {
        None => requested.clone(),
        Some(record) => requested
            .iter()
            .filter(|field| !record.slot(field).is_known())
            .cloned()
            .collect(),
    }
}
