//! Reference Data Test Utilities
//!
//! Shared test infrastructure for the reference-data workspace:
//! - A scriptable mock upstream provider that records every call
//! - A store wrapper counting loads and saves
//! - Proptest generators for records and field values
//! - Fixtures and assertions for common scenarios

pub use refdata_core::{
    FieldValue, FieldValues, RefDataError, RefDataResult, ReferenceData, ReferenceDataError,
    ReferenceDataProvider, ReferenceDataRequest, ReferenceDataResponse, StorageError,
    UpstreamError, ValidationError, ENTITLEMENT_CATEGORY, INVALID_FIELD_CATEGORY,
};
pub use refdata_cache::{FieldValueStore, InvalidFieldStore};

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Error category the mock uses for identifiers it has never heard of.
pub const UNKNOWN_SECURITY_CATEGORY: &str = "BAD_SEC";

// ============================================================================
// MOCK UPSTREAM
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    /// Everything the upstream "knows", per identifier.
    universe: HashMap<String, ReferenceData>,
    /// Fields answered with an invalid-field error, per identifier.
    invalid: HashMap<String, BTreeSet<String>>,
    /// Records returned in every response even though nobody asked.
    unsolicited: Vec<ReferenceData>,
    calls: Vec<ReferenceDataRequest>,
    fail_next: Option<UpstreamError>,
}

/// Scriptable upstream provider.
///
/// Answers each request from a scripted universe, restricted to the
/// requested identifiers and fields. Identifiers missing from the universe
/// come back with a single identifier-level [`UNKNOWN_SECURITY_CATEGORY`] error.
#[derive(Debug, Default)]
pub struct MockReferenceDataProvider {
    state: Mutex<MockState>,
}

impl MockReferenceDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Make `identifier` known to the upstream, with no fields yet.
    pub fn add_security(&self, identifier: &str) -> &Self {
        self.with_state(|s| {
            s.universe
                .entry(identifier.to_string())
                .or_insert_with(|| ReferenceData::new(identifier));
        });
        self
    }

    /// Append a value for `field`. Call repeatedly for repeated fields.
    pub fn add_value(&self, identifier: &str, field: &str, value: FieldValue) -> &Self {
        self.with_state(|s| {
            s.universe
                .entry(identifier.to_string())
                .or_insert_with(|| ReferenceData::new(identifier))
                .add_field_value(field, value);
        });
        self
    }

    /// Replace every value of `field` with `value`.
    pub fn set_value(&self, identifier: &str, field: &str, value: FieldValue) -> &Self {
        self.with_state(|s| {
            let record = s
                .universe
                .entry(identifier.to_string())
                .or_insert_with(|| ReferenceData::new(identifier));
            record.remove_field(field);
            record.add_field_value(field, value);
        });
        self
    }

    /// Stop returning `field` for `identifier`.
    pub fn remove_value(&self, identifier: &str, field: &str) -> &Self {
        self.with_state(|s| {
            if let Some(record) = s.universe.get_mut(identifier) {
                record.remove_field(field);
            }
        });
        self
    }

    /// Attach an error returned whenever `identifier` is requested (and, for
    /// field errors, the field is requested too).
    pub fn add_error(&self, identifier: &str, error: ReferenceDataError) -> &Self {
        self.with_state(|s| {
            s.universe
                .entry(identifier.to_string())
                .or_insert_with(|| ReferenceData::new(identifier))
                .add_error(error);
        });
        self
    }

    /// Answer `field` for `identifier` with an invalid-field error.
    pub fn reject_field(&self, identifier: &str, field: &str) -> &Self {
        self.with_state(|s| {
            s.universe
                .entry(identifier.to_string())
                .or_insert_with(|| ReferenceData::new(identifier));
            s.invalid
                .entry(identifier.to_string())
                .or_default()
                .insert(field.to_string());
        });
        self
    }

    /// Include `record` in every response, requested or not.
    pub fn add_unsolicited(&self, record: ReferenceData) -> &Self {
        self.with_state(|s| s.unsolicited.push(record));
        self
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: UpstreamError) -> &Self {
        self.with_state(|s| s.fail_next = Some(error));
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<ReferenceDataRequest> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn call_count(&self) -> usize {
        self.with_state(|s| s.calls.len())
    }

    /// Forget recorded calls.
    pub fn reset_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    fn answer(state: &MockState, identifier: &str, fields: &BTreeSet<String>) -> ReferenceData {
        let Some(known) = state.universe.get(identifier) else {
            let mut record = ReferenceData::new(identifier);
            record.add_error(ReferenceDataError::for_identifier(
                -1,
                UNKNOWN_SECURITY_CATEGORY,
                "Unknown/Invalid security",
            ));
            return record;
        };

        let mut record =
            ReferenceData::with_values(identifier, known.field_values().retain_fields(fields));
        for error in known.errors() {
            let wanted = error.field.as_ref().map_or(true, |f| fields.contains(f));
            if wanted {
                record.add_error(error.clone());
            }
        }
        if let Some(invalid) = state.invalid.get(identifier) {
            for field in invalid.intersection(fields) {
                record.add_error(fixtures::invalid_field_error(field));
            }
        }
        record
    }
}

#[async_trait]
impl ReferenceDataProvider for MockReferenceDataProvider {
    async fn get_reference_data(
        &self,
        request: &ReferenceDataRequest,
    ) -> RefDataResult<ReferenceDataResponse> {
        self.with_state(|state| {
            state.calls.push(request.clone());
            if let Some(error) = state.fail_next.take() {
                return Err(RefDataError::from(error));
            }

            let mut response: ReferenceDataResponse = state.unsolicited.iter().cloned().collect();
            for identifier in request.identifiers() {
                response.add(Self::answer(state, identifier, request.fields()));
            }
            Ok(response)
        })
    }
}

// ============================================================================
// COUNTING STORE
// ============================================================================

/// Store wrapper counting the loads and saves that reach the inner store.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    loads: AtomicU64,
    saves: AtomicU64,
    saved: Mutex<Vec<String>>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            loads: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of field-value loads.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of field-value saves.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Identifiers saved, in order, with repeats.
    pub fn saved_identifiers(&self) -> Vec<String> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        self.loads.store(0, Ordering::SeqCst);
        self.saves.store(0, Ordering::SeqCst);
        if let Ok(mut saved) = self.saved.lock() {
            saved.clear();
        }
    }
}

#[async_trait]
impl<S: FieldValueStore> FieldValueStore for CountingStore<S> {
    async fn load_field_values(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, ReferenceData>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_field_values(identifiers).await
    }

    async fn save_field_values(&self, record: &ReferenceData) -> RefDataResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(record.identifier().to_string());
        }
        self.inner.save_field_values(record).await
    }

    async fn identifiers(&self) -> RefDataResult<Vec<String>> {
        self.inner.identifiers().await
    }
}

#[async_trait]
impl<S: InvalidFieldStore> InvalidFieldStore for CountingStore<S> {
    async fn load_invalid_fields(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, BTreeSet<String>>> {
        self.inner.load_invalid_fields(identifiers).await
    }

    async fn save_invalid_fields(
        &self,
        identifier: &str,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<()> {
        self.inner.save_invalid_fields(identifier, fields).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for reference-data types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a security identifier such as `ABC12 Equity`.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[A-Z]{2,5}[0-9]{0,2} (Equity|Corp|Govt)"
    }

    /// Generate a field mnemonic such as `PX_LAST`.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[A-Z]{2,4}_[A-Z]{2,6}"
    }

    /// Generate a field value of the kinds upstreams return.
    pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            any::<i64>().prop_map(FieldValue::from),
            (-1.0e9f64..1.0e9f64).prop_map(FieldValue::from),
            "[ -~]{0,24}".prop_map(FieldValue::from),
            any::<bool>().prop_map(FieldValue::from),
            prop::collection::vec("[A-Z]{1,8}", 0..4).prop_map(FieldValue::from),
        ]
    }

    /// Generate a field map in which some names repeat. The pool includes
    /// names a document store must escape.
    pub fn arb_field_values() -> impl Strategy<Value = FieldValues> {
        prop::collection::vec(
            (
                prop::sample::select(vec![
                    "PX_LAST",
                    "NAME",
                    "TICKER",
                    "HOLIDAYS",
                    "NOT_AVAILABLE_FIELD",
                    "\\PATH",
                ]),
                arb_field_value(),
            ),
            0..8,
        )
        .prop_map(|entries| entries.into_iter().collect())
    }

    /// Generate an upstream error, field-scoped or not.
    pub fn arb_error() -> impl Strategy<Value = ReferenceDataError> {
        (
            prop::option::of(arb_field_name()),
            0i32..100,
            prop::sample::select(vec![INVALID_FIELD_CATEGORY, ENTITLEMENT_CATEGORY, "TIMEOUT"]),
            "[a-z ]{0,20}",
        )
            .prop_map(|(field, code, category, message)| ReferenceDataError {
                field,
                code,
                category: category.to_string(),
                subcategory: None,
                message,
            })
    }

    /// Generate a record with values, not-available marks and errors.
    pub fn arb_reference_data() -> impl Strategy<Value = ReferenceData> {
        (
            arb_identifier(),
            arb_field_values(),
            prop::collection::btree_set(arb_field_name(), 0..4),
            prop::collection::vec(arb_error(), 0..3),
        )
            .prop_map(|(identifier, values, not_available, errors)| {
                let mut record = ReferenceData::with_values(identifier, values);
                for field in not_available {
                    record.mark_not_available(field);
                }
                for error in errors {
                    record.add_error(error);
                }
                record
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made records and requests.

    use super::*;
    use serde_json::json;

    /// Invalid-field error for `field`.
    pub fn invalid_field_error(field: &str) -> ReferenceDataError {
        ReferenceDataError::for_field(field, 9, INVALID_FIELD_CATEGORY, "Field not valid")
    }

    /// Identifier-level entitlement error.
    pub fn entitlement_error() -> ReferenceDataError {
        ReferenceDataError::for_identifier(2, ENTITLEMENT_CATEGORY, "No entitlement")
            .with_subcategory("NO_SUBSCRIPTION")
    }

    /// An equity with a price, a name and two tickers.
    pub fn equity(identifier: &str) -> ReferenceData {
        let mut record = ReferenceData::new(identifier);
        record.add_field_value("PX_LAST", json!(101.25));
        record.add_field_value("NAME", json!(format!("{identifier} Holdings")));
        record.add_field_value("TICKER", json!("ABC"));
        record.add_field_value("TICKER", json!("ABC.N"));
        record
    }

    /// Mock upstream knowing each identifier as an [`equity`].
    pub fn equity_upstream(identifiers: &[&str]) -> MockReferenceDataProvider {
        let upstream = MockReferenceDataProvider::new();
        for identifier in identifiers {
            for (field, value) in equity(identifier).field_values().iter() {
                upstream.add_value(identifier, field, value.clone());
            }
        }
        upstream
    }

    /// A cache-enabled request.
    pub fn cached_request(identifiers: &[&str], fields: &[&str]) -> ReferenceDataRequest {
        match ReferenceDataRequest::new(identifiers.iter().copied(), fields.iter().copied(), true) {
            Ok(request) => request,
            Err(e) => panic!("fixture request should be valid: {e}"),
        }
    }

    /// A request bypassing the cache.
    pub fn uncached_request(identifiers: &[&str], fields: &[&str]) -> ReferenceDataRequest {
        match ReferenceDataRequest::new(identifiers.iter().copied(), fields.iter().copied(), false) {
            Ok(request) => request,
            Err(e) => panic!("fixture request should be valid: {e}"),
        }
    }

    /// Identifier set from string slices.
    pub fn ids(identifiers: &[&str]) -> BTreeSet<String> {
        identifiers.iter().map(|s| s.to_string()).collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for reference-data results.

    use super::*;

    /// Assert that a result is an upstream error.
    #[track_caller]
    pub fn assert_upstream_error<T: std::fmt::Debug>(result: &RefDataResult<T>) {
        match result {
            Err(RefDataError::Upstream(_)) => {}
            other => panic!("Expected Upstream error, got: {:?}", other),
        }
    }

    /// Assert that a result is a storage codec error.
    #[track_caller]
    pub fn assert_codec_error<T: std::fmt::Debug>(result: &RefDataResult<T>) {
        match result {
            Err(RefDataError::Storage(StorageError::Codec { .. })) => {}
            other => panic!("Expected Codec error, got: {:?}", other),
        }
    }

    /// Assert that a result is a validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &RefDataResult<T>) {
        match result {
            Err(RefDataError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that `record` holds exactly these values for `field`, in order.
    #[track_caller]
    pub fn assert_values(record: &ReferenceData, field: &str, expected: &[FieldValue]) {
        let actual: Vec<&FieldValue> = record.field_values().get_all(field).collect();
        let expected: Vec<&FieldValue> = expected.iter().collect();
        assert_eq!(
            actual, expected,
            "values of {} for {}",
            field,
            record.identifier()
        );
    }
}
