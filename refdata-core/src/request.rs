//! Bulk get requests and their results.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{RefDataResult, ValidationError};
use crate::record::ReferenceData;

/// A bulk request: many identifiers, many fields, one call.
///
/// Identifiers and fields are held in sorted sets so that requests derived
/// from them (partition keys, upstream sub-requests) are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDataRequest {
    identifiers: BTreeSet<String>,
    fields: BTreeSet<String>,
    use_cache: bool,
}

impl ReferenceDataRequest {
    /// Create a validated request.
    ///
    /// The identifier set must be non-empty, and neither identifiers nor
    /// field names may be blank. An empty field set is legal.
    pub fn new<I, F>(identifiers: I, fields: F, use_cache: bool) -> RefDataResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let identifiers: BTreeSet<String> = identifiers.into_iter().map(Into::into).collect();
        let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();

        if identifiers.is_empty() {
            return Err(ValidationError::EmptyIdentifiers.into());
        }
        if identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err(ValidationError::BlankIdentifier.into());
        }
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ValidationError::BlankField.into());
        }

        Ok(Self {
            identifiers,
            fields,
            use_cache,
        })
    }

    /// Convenience constructor for a single identifier.
    pub fn single<F>(identifier: impl Into<String>, fields: F, use_cache: bool) -> RefDataResult<Self>
    where
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let identifier: String = identifier.into();
        Self::new([identifier], fields, use_cache)
    }

    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }
}

/// The result of a bulk request: one record per identifier.
///
/// Position is not meaningful; look records up by identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDataResponse {
    records: BTreeMap<String, ReferenceData>,
}

impl ReferenceDataResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, replacing any existing record for the same identifier.
    pub fn add(&mut self, record: ReferenceData) {
        self.records.insert(record.identifier().to_string(), record);
    }

    /// The record for `identifier`, if present.
    pub fn get(&self, identifier: &str) -> Option<&ReferenceData> {
        self.records.get(identifier)
    }

    /// Remove and return the record for `identifier`.
    pub fn take(&mut self, identifier: &str) -> Option<ReferenceData> {
        self.records.remove(identifier)
    }

    /// Identifiers covered by this response.
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceData> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<ReferenceData> {
        self.records.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ReferenceData> for ReferenceDataResponse {
    fn from_iter<T: IntoIterator<Item = ReferenceData>>(iter: T) -> Self {
        let mut response = Self::new();
        for record in iter {
            response.add(record);
        }
        response
    }
}

impl IntoIterator for ReferenceDataResponse {
    type Item = ReferenceData;
    type IntoIter = std::collections::btree_map::IntoValues<String, ReferenceData>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}
