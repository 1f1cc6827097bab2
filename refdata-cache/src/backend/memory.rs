//! In-process store on concurrent hash maps.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;
use refdata_core::{RefDataResult, ReferenceData};

use crate::traits::{FieldValueStore, InvalidFieldStore};

/// Store holding everything in memory.
///
/// Suited to tests and short-lived processes. Writes to different
/// identifiers land in different shards and do not contend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    field_values: DashMap<String, ReferenceData>,
    invalid_fields: DashMap<String, BTreeSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached record and invalid-field set.
    pub fn clear(&self) {
        self.field_values.clear();
        self.invalid_fields.clear();
    }

    pub fn len(&self) -> usize {
        self.field_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }
}

#[async_trait]
impl FieldValueStore for InMemoryStore {
    async fn load_field_values(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, ReferenceData>> {
        Ok(identifiers
            .iter()
            .filter_map(|id| {
                self.field_values
                    .get(id)
                    .map(|record| (id.clone(), record.value().clone()))
            })
            .collect())
    }

    async fn save_field_values(&self, record: &ReferenceData) -> RefDataResult<()> {
        self.field_values
            .insert(record.identifier().to_string(), record.clone());
        Ok(())
    }

    async fn identifiers(&self) -> RefDataResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .field_values
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn entry_count(&self) -> RefDataResult<u64> {
        Ok(self.field_values.len() as u64)
    }
}

#[async_trait]
impl InvalidFieldStore for InMemoryStore {
    async fn load_invalid_fields(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, BTreeSet<String>>> {
        Ok(identifiers
            .iter()
            .filter_map(|id| {
                self.invalid_fields
                    .get(id)
                    .map(|fields| (id.clone(), fields.value().clone()))
            })
            .collect())
    }

    async fn save_invalid_fields(
        &self,
        identifier: &str,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<()> {
        self.invalid_fields
            .insert(identifier.to_string(), fields.clone());
        Ok(())
    }
}
