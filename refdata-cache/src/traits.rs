//! Backend store traits and cache statistics.
//!
//! A backend store persists what the caching decorators learn: per-identifier
//! field values (with not-available marks and errors) and, separately, the
//! set of fields the upstream declared invalid for each identifier.

use async_trait::async_trait;
use refdata_core::{RefDataResult, ReferenceData};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Store for per-identifier field values.
///
/// # Concurrency
///
/// Implementations must allow concurrent reads. Writes for different
/// identifiers must not block one another. Concurrent writes for the same
/// identifier resolve last-write-wins; callers never get read-modify-write
/// atomicity across `load_field_values` and `save_field_values`.
///
/// # Serialization
///
/// Persisted forms must preserve repeated field names and their insertion
/// order, and must keep not-available fields distinct from resolved ones.
#[async_trait]
pub trait FieldValueStore: Send + Sync {
    /// Load cached records. Identifiers with nothing cached are absent from
    /// the returned map.
    async fn load_field_values(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, ReferenceData>>;

    /// Persist a record, replacing whatever was stored for its identifier.
    async fn save_field_values(&self, record: &ReferenceData) -> RefDataResult<()>;

    /// Load a single cached record.
    async fn load(&self, identifier: &str) -> RefDataResult<Option<ReferenceData>> {
        let identifiers: BTreeSet<String> = [identifier.to_string()].into_iter().collect();
        let mut loaded = self.load_field_values(&identifiers).await?;
        Ok(loaded.remove(identifier))
    }

    /// Every identifier currently cached, sorted.
    async fn identifiers(&self) -> RefDataResult<Vec<String>>;

    /// Number of cached identifiers.
    async fn entry_count(&self) -> RefDataResult<u64> {
        Ok(self.identifiers().await?.len() as u64)
    }
}

/// Store for the fields the upstream has declared permanently invalid.
#[async_trait]
pub trait InvalidFieldStore: Send + Sync {
    /// Load known invalid fields. Identifiers with nothing recorded are
    /// absent from the returned map.
    async fn load_invalid_fields(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, BTreeSet<String>>>;

    /// Replace the invalid-field set for an identifier.
    async fn save_invalid_fields(
        &self,
        identifier: &str,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<()>;
}

#[async_trait]
impl<S: FieldValueStore + ?Sized> FieldValueStore for Arc<S> {
    async fn load_field_values(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, ReferenceData>> {
        (**self).load_field_values(identifiers).await
    }

    async fn save_field_values(&self, record: &ReferenceData) -> RefDataResult<()> {
        (**self).save_field_values(record).await
    }

    async fn identifiers(&self) -> RefDataResult<Vec<String>> {
        (**self).identifiers().await
    }

    async fn entry_count(&self) -> RefDataResult<u64> {
        (**self).entry_count().await
    }
}

#[async_trait]
impl<S: InvalidFieldStore + ?Sized> InvalidFieldStore for Arc<S> {
    async fn load_invalid_fields(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, BTreeSet<String>>> {
        (**self).load_invalid_fields(identifiers).await
    }

    async fn save_invalid_fields(
        &self,
        identifier: &str,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<()> {
        (**self).save_invalid_fields(identifier, fields).await
    }
}

/// Counters kept by the field-value cache decorator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Bulk requests served through the cache.
    pub requests: u64,
    /// Identifiers answered entirely from the store.
    pub identifiers_from_cache: u64,
    /// Identifiers that needed an upstream query.
    pub identifiers_from_upstream: u64,
    /// Upstream calls issued.
    pub upstream_calls: u64,
    /// Records written to the store.
    pub records_written: u64,
    /// Refreshed records left untouched because nothing changed.
    pub refresh_unchanged: u64,
}

impl CacheStats {
    /// Fraction of identifiers answered from cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.identifiers_from_cache + self.identifiers_from_upstream;
        if total == 0 {
            0.0
        } else {
            self.identifiers_from_cache as f64 / total as f64
        }
    }
}
