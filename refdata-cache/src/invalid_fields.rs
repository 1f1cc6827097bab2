//! Invalid-field caching decorator.
//!
//! Remembers fields the upstream rejected as invalid for an identifier and
//! leaves them out of every later query for that identifier.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use refdata_core::{
    CacheSettings, RefDataResult, ReferenceData, ReferenceDataProvider, ReferenceDataRequest,
    ReferenceDataResponse,
};

use crate::partition::RequestPartition;
use crate::traits::InvalidFieldStore;
use crate::value_cache::batches;

/// Decorator filtering known-invalid fields out of upstream requests.
///
/// Filtering applies whatever the request's `use_cache` flag says; the flag
/// itself is passed through untouched, so this decorator can sit beneath a
/// [`ValueCachingProvider`](crate::ValueCachingProvider).
pub struct InvalidFieldCachingProvider<P, S: ?Sized> {
    underlying: P,
    store: Arc<S>,
    settings: CacheSettings,
}

impl<P, S> InvalidFieldCachingProvider<P, S>
where
    P: ReferenceDataProvider,
    S: InvalidFieldStore + ?Sized,
{
    pub fn new(underlying: P, store: Arc<S>, settings: CacheSettings) -> Self {
        Self {
            underlying,
            store,
            settings,
        }
    }

    pub fn with_defaults(underlying: P, store: Arc<S>) -> Self {
        Self::new(underlying, store, CacheSettings::default())
    }

    pub fn underlying(&self) -> &P {
        &self.underlying
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn remember_invalid_fields(
        &self,
        record: &ReferenceData,
        known: &HashMap<String, BTreeSet<String>>,
    ) -> RefDataResult<()> {
        let reported = record.invalid_fields();
        let previous = known.get(record.identifier());
        let is_new = match previous {
            Some(previous) => !reported.is_subset(previous),
            None => !reported.is_empty(),
        };
        if !is_new {
            return Ok(());
        }

        let mut all = previous.cloned().unwrap_or_default();
        all.extend(reported);
        tracing::warn!(
            identifier = %record.identifier(),
            fields = ?all,
            "Recording invalid fields"
        );
        self.store.save_invalid_fields(record.identifier(), &all).await
    }
}

#[async_trait]
impl<P, S> ReferenceDataProvider for InvalidFieldCachingProvider<P, S>
where
    P: ReferenceDataProvider,
    S: InvalidFieldStore + ?Sized,
{
    async fn get_reference_data(
        &self,
        request: &ReferenceDataRequest,
    ) -> RefDataResult<ReferenceDataResponse> {
        let known = self.store.load_invalid_fields(request.identifiers()).await?;

        let mut partition = RequestPartition::new();
        for identifier in request.identifiers() {
            let fields = match known.get(identifier) {
                Some(invalid) => request.fields().difference(invalid).cloned().collect(),
                None => request.fields().clone(),
            };
            partition.insert(fields, identifier.clone());
        }

        let mut result = ReferenceDataResponse::new();

        if let Some(nothing_to_ask) = partition.satisfied() {
            tracing::debug!(
                identifiers = nothing_to_ask.len(),
                "No valid fields left to request"
            );
            for identifier in nothing_to_ask {
                result.add(ReferenceData::new(identifier.clone()));
            }
        }

        for (fields, identifiers) in partition.pending() {
            for chunk in batches(identifiers, self.settings.upstream_batch_size) {
                let sub_request = ReferenceDataRequest::new(
                    chunk.iter().cloned(),
                    fields.iter().cloned(),
                    request.use_cache(),
                )?;
                let mut response = self.underlying.get_reference_data(&sub_request).await?;

                for identifier in &chunk {
                    let record = response
                        .take(identifier)
                        .unwrap_or_else(|| ReferenceData::new(identifier.clone()));
                    self.remember_invalid_fields(&record, &known).await?;
                    result.add(record);
                }
            }
        }

        Ok(result)
    }
}
