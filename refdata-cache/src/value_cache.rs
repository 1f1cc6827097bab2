//! Field-value caching decorator.
//!
//! Wraps an upstream [`ReferenceDataProvider`] and answers each requested
//! (identifier, field) pair from the store when it is known, querying the
//! upstream only for what is missing. Everything the upstream returns is
//! merged into the cached record and written back before the call returns.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use refdata_core::{
    CacheSettings, RefDataResult, ReferenceData, ReferenceDataProvider, ReferenceDataRequest,
    ReferenceDataResponse,
};

use crate::merge::{combine, differs, strip};
use crate::partition::RequestPartition;
use crate::refresh::RefreshSummary;
use crate::traits::{CacheStats, FieldValueStore};

/// Caching decorator over an upstream provider and a field-value store.
///
/// # Type Parameters
///
/// - `P`: the upstream provider being decorated
/// - `S`: the backend store holding cached records
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// let cache = ValueCachingProvider::with_defaults(upstream, store);
///
/// let request = ReferenceDataRequest::new(["SEC1"], ["PX_LAST"], true)?;
/// let response = cache.get_reference_data(&request).await?;
/// ```
pub struct ValueCachingProvider<P, S: ?Sized> {
    underlying: P,
    store: Arc<S>,
    settings: CacheSettings,
    stats: Arc<RwLock<CacheStats>>,
}

impl<P, S> ValueCachingProvider<P, S>
where
    P: ReferenceDataProvider,
    S: FieldValueStore + ?Sized,
{
    pub fn new(underlying: P, store: Arc<S>, settings: CacheSettings) -> Self {
        Self {
            underlying,
            store,
            settings,
            stats: Arc::new(RwLock::new(CacheStats::default())),
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

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn record_stats(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut *stats);
        }
    }

    async fn get_cached(&self, request: &ReferenceDataRequest) -> RefDataResult<ReferenceDataResponse> {
        self.record_stats(|s| s.requests += 1);

        let cached = self.store.load_field_values(request.identifiers()).await?;
        let partition = RequestPartition::for_request(request, &cached);
        tracing::debug!(
            identifiers = request.identifiers().len(),
            cached = cached.len(),
            groups = partition.len(),
            "Partitioned request by missing fields"
        );
        let resolved = self.load_and_persist_missing(&cached, &partition).await?;

        Ok(resolved
            .iter()
            .map(|record| strip(record, request.fields()))
            .collect())
    }

    async fn load_and_persist_missing(
        &self,
        cached: &HashMap<String, ReferenceData>,
        partition: &RequestPartition,
    ) -> RefDataResult<ReferenceDataResponse> {
        let mut result = ReferenceDataResponse::new();

        if let Some(satisfied) = partition.satisfied() {
            tracing::debug!(
                identifiers = satisfied.len(),
                "Satisfied identifiers entirely from cache"
            );
            self.record_stats(|s| s.identifiers_from_cache += satisfied.len() as u64);
            for identifier in satisfied {
                let record = cached
                    .get(identifier)
                    .cloned()
                    .unwrap_or_else(|| ReferenceData::new(identifier.clone()));
                result.add(record);
            }
        }

        for (fields, identifiers) in partition.pending() {
            tracing::info!(
                fields = fields.len(),
                identifiers = identifiers.len(),
                "Loading fields from underlying provider"
            );
            self.record_stats(|s| s.identifiers_from_upstream += identifiers.len() as u64);

            for chunk in batches(identifiers, self.settings.upstream_batch_size) {
                let mut fresh = self.query_underlying(&chunk, fields).await?;

                for identifier in &chunk {
                    let fresh_record = fresh
                        .take(identifier)
                        .unwrap_or_else(|| ReferenceData::new(identifier.clone()));
                    let combined = combine(fields, cached.get(identifier), &fresh_record);
                    self.store.save_field_values(&combined).await?;
                    self.record_stats(|s| s.records_written += 1);
                    result.add(combined);
                }

                warn_unrequested(&fresh);
            }
        }

        Ok(result)
    }

    async fn query_underlying(
        &self,
        identifiers: &BTreeSet<String>,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<ReferenceDataResponse> {
        let request =
            ReferenceDataRequest::new(identifiers.iter().cloned(), fields.iter().cloned(), false)?;
        self.record_stats(|s| s.upstream_calls += 1);
        self.underlying.get_reference_data(&request).await
    }

    /// Re-query the upstream for every field already known for the given
    /// identifiers and rewrite records whose content changed.
    ///
    /// Identifiers with nothing cached are skipped. Records the upstream
    /// omits from its response are left as they are.
    pub async fn refresh(&self, identifiers: &BTreeSet<String>) -> RefDataResult<RefreshSummary> {
        let cached = self.store.load_field_values(identifiers).await?;
        self.refresh_loaded(identifiers, &cached).await
    }

    pub(crate) async fn refresh_loaded(
        &self,
        identifiers: &BTreeSet<String>,
        cached: &HashMap<String, ReferenceData>,
    ) -> RefDataResult<RefreshSummary> {
        let mut summary = RefreshSummary {
            selected: identifiers.len(),
            uncached: identifiers.iter().filter(|id| !cached.contains_key(*id)).count(),
            ..Default::default()
        };

        let partition = RequestPartition::for_refresh(identifiers, cached);
        if let Some(nothing_known) = partition.satisfied() {
            summary.unchanged += nothing_known.len();
        }

        for (fields, group) in partition.pending() {
            tracing::info!(
                fields = fields.len(),
                identifiers = group.len(),
                "Refreshing fields from underlying provider"
            );

            for chunk in batches(group, self.settings.upstream_batch_size) {
                let mut fresh = self.query_underlying(&chunk, fields).await?;

                for identifier in &chunk {
                    let (Some(previous), Some(fresh_record)) =
                        (cached.get(identifier), fresh.take(identifier))
                    else {
                        summary.not_returned += 1;
                        continue;
                    };

                    let refreshed = combine(fields, None, &fresh_record);
                    if differs(previous, &refreshed) {
                        self.store.save_field_values(&refreshed).await?;
                        self.record_stats(|s| s.records_written += 1);
                        summary.rewritten += 1;
                    } else {
                        self.record_stats(|s| s.refresh_unchanged += 1);
                        summary.unchanged += 1;
                    }
                }

                warn_unrequested(&fresh);
            }
        }

        tracing::info!(
            selected = summary.selected,
            rewritten = summary.rewritten,
            unchanged = summary.unchanged,
            uncached = summary.uncached,
            not_returned = summary.not_returned,
            "Refresh pass complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl<P, S> ReferenceDataProvider for ValueCachingProvider<P, S>
where
    P: ReferenceDataProvider,
    S: FieldValueStore + ?Sized,
{
    async fn get_reference_data(
        &self,
        request: &ReferenceDataRequest,
    ) -> RefDataResult<ReferenceDataResponse> {
        if !request.use_cache() {
            return self.underlying.get_reference_data(request).await;
        }
        self.get_cached(request).await
    }
}

/// Split a sorted identifier set into consecutive batches of at most `size`.
pub(crate) fn batches(identifiers: &BTreeSet<String>, size: usize) -> Vec<BTreeSet<String>> {
    let ids: Vec<&String> = identifiers.iter().collect();
    ids.chunks(size.max(1))
        .map(|chunk| chunk.iter().map(|id| (*id).clone()).collect())
        .collect()
}

/// Whatever is left in an upstream response after the requested
/// identifiers were taken out was never asked for.
fn warn_unrequested(leftover: &ReferenceDataResponse) {
    if !leftover.is_empty() {
        tracing::warn!(
            count = leftover.len(),
            identifiers = ?leftover.identifiers(),
            "Ignoring records for identifiers that were not requested"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use refdata_core::{ReferenceDataError, UpstreamError};
    use serde_json::json;
    use std::sync::Mutex;

    /// Upstream returning `"{id}:{field}"` for every field except `MISSING`,
    /// and recording each call it receives.
    #[derive(Default)]
    struct ScriptedUpstream {
        calls: Mutex<Vec<ReferenceDataRequest>>,
        fail: bool,
    }

    impl ScriptedUpstream {
        fn calls(&self) -> Vec<ReferenceDataRequest> {
            self.calls.lock().expect("lock should not be poisoned").clone()
        }
    }

    #[async_trait]
    impl ReferenceDataProvider for ScriptedUpstream {
        async fn get_reference_data(
            &self,
            request: &ReferenceDataRequest,
        ) -> RefDataResult<ReferenceDataResponse> {
            self.calls
                .lock()
                .expect("lock should not be poisoned")
                .push(request.clone());
            if self.fail {
                return Err(UpstreamError::Unavailable {
                    provider: "scripted".to_string(),
                    reason: "down".to_string(),
                }
                .into());
            }
            Ok(request
                .identifiers()
                .iter()
                .map(|id| {
                    let mut record = ReferenceData::new(id.clone());
                    for field in request.fields().iter().filter(|f| *f != "MISSING") {
                        record.add_field_value(field.clone(), json!(format!("{id}:{field}")));
                    }
                    record
                })
                .collect())
        }
    }

    fn request(ids: &[&str], fields: &[&str]) -> ReferenceDataRequest {
        ReferenceDataRequest::new(ids.iter().copied(), fields.iter().copied(), true)
            .expect("request should be valid")
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let cache = ValueCachingProvider::with_defaults(
            ScriptedUpstream::default(),
            Arc::new(InMemoryStore::new()),
        );
        let req = request(&["SEC1", "SEC2"], &["PX_LAST"]);

        let first = cache.get_reference_data(&req).await.expect("first call should succeed");
        let second = cache.get_reference_data(&req).await.expect("second call should succeed");

        assert_eq!(first, second);
        assert_eq!(cache.underlying().calls().len(), 1);
        let stats = cache.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.identifiers_from_cache, 2);
        assert_eq!(stats.identifiers_from_upstream, 2);
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_not_available_field_is_not_requeried() {
        let cache = ValueCachingProvider::with_defaults(
            ScriptedUpstream::default(),
            Arc::new(InMemoryStore::new()),
        );
        let req = request(&["SEC1"], &["PX_LAST", "MISSING"]);

        let first = cache.get_reference_data(&req).await.expect("call should succeed");
        cache.get_reference_data(&req).await.expect("call should succeed");

        let record = first.get("SEC1").expect("record should exist");
        assert!(!record.field_values().contains("MISSING"));
        assert!(record.not_available().is_empty());
        assert_eq!(cache.underlying().calls().len(), 1);

        let stored = cache
            .store()
            .load("SEC1")
            .await
            .expect("load should succeed")
            .expect("record should be cached");
        assert!(stored.not_available().contains("MISSING"));
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_store() {
        let store = Arc::new(InMemoryStore::new());
        let cache = ValueCachingProvider::with_defaults(ScriptedUpstream::default(), store.clone());
        let req = ReferenceDataRequest::new(["SEC1"], ["PX_LAST"], false)
            .expect("request should be valid");

        cache.get_reference_data(&req).await.expect("call should succeed");
        cache.get_reference_data(&req).await.expect("call should succeed");

        assert_eq!(cache.underlying().calls().len(), 2);
        assert_eq!(store.entry_count().await.expect("count should succeed"), 0);
    }

    #[tokio::test]
    async fn test_upstream_calls_are_batched() {
        let cache = ValueCachingProvider::new(
            ScriptedUpstream::default(),
            Arc::new(InMemoryStore::new()),
            CacheSettings::new().with_upstream_batch_size(2),
        );
        let req = request(&["A", "B", "C", "D", "E"], &["X"]);

        let response = cache.get_reference_data(&req).await.expect("call should succeed");

        assert_eq!(response.len(), 5);
        let sizes: Vec<_> = cache
            .underlying()
            .calls()
            .iter()
            .map(|c| c.identifiers().len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(cache.underlying().calls().iter().all(|c| !c.use_cache()));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let cache = ValueCachingProvider::with_defaults(
            ScriptedUpstream {
                fail: true,
                ..Default::default()
            },
            Arc::new(InMemoryStore::new()),
        );

        let err = cache
            .get_reference_data(&request(&["SEC1"], &["PX_LAST"]))
            .await
            .expect_err("upstream failure should propagate");
        assert!(matches!(err, refdata_core::RefDataError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_refresh_skips_uncached_identifiers() {
        let cache = ValueCachingProvider::with_defaults(
            ScriptedUpstream::default(),
            Arc::new(InMemoryStore::new()),
        );
        let ids: BTreeSet<String> = ["NEVER_SEEN".to_string()].into_iter().collect();

        let summary = cache.refresh(&ids).await.expect("refresh should succeed");

        assert_eq!(summary.uncached, 1);
        assert_eq!(summary.rewritten, 0);
        assert!(cache.underlying().calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_drops_stale_errors_once() {
        let store = Arc::new(InMemoryStore::new());
        let mut stale = ReferenceData::new("SEC1");
        stale.add_field_value("PX_LAST", json!("SEC1:PX_LAST"));
        stale.add_error(ReferenceDataError::for_identifier(3, "TIMEOUT", "slow"));
        store.save_field_values(&stale).await.expect("save should succeed");

        let cache = ValueCachingProvider::with_defaults(ScriptedUpstream::default(), store.clone());
        let ids: BTreeSet<String> = ["SEC1".to_string()].into_iter().collect();

        let first = cache.refresh(&ids).await.expect("refresh should succeed");
        let second = cache.refresh(&ids).await.expect("refresh should succeed");

        assert_eq!(first.rewritten, 1);
        assert_eq!(second.rewritten, 0);
        assert_eq!(second.unchanged, 1);
        let stored = store.load("SEC1").await.expect("load should succeed").expect("cached");
        assert!(stored.errors().is_empty());
    }

    #[test]
    fn test_batches_split_in_order() {
        let ids: BTreeSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let split = batches(&ids, 2);
        assert_eq!(split.len(), 2);
        assert!(split[0].contains("A") && split[0].contains("B"));
        assert!(split[1].contains("C"));
        assert_eq!(batches(&ids, 0).len(), 3);
    }
}
