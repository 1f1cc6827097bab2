//! Behavior shared by every backend store.

use std::sync::Arc;

use proptest::prelude::*;
use refdata_cache::backend::document::{decode_document, encode_document};
use refdata_cache::backend::stored::{decode_record, encode_record};
use refdata_cache::{
    DocumentStore, FieldValueStore, InMemoryStore, InvalidFieldStore, LmdbStore,
    ValueCachingProvider,
};
use refdata_core::{CacheSettings, DocumentSettings, ReferenceData, ReferenceDataProvider};
use refdata_test_utils::fixtures::{cached_request, equity, equity_upstream, ids};
use refdata_test_utils::generators::arb_reference_data;
use serde_json::json;
use tempfile::TempDir;

fn record_with_repeats() -> ReferenceData {
    let mut record = equity("IBM US Equity");
    record.add_field_value("HOLIDAYS", json!("2026-01-01"));
    record.add_field_value("HOLIDAYS", json!("2026-07-04"));
    record.add_field_value("HOLIDAYS", json!("2026-12-25"));
    record.mark_not_available("PX_BID");
    record
}

async fn assert_round_trip<S: FieldValueStore + InvalidFieldStore>(store: &S) {
    let record = record_with_repeats();
    store.save_field_values(&record).await.expect("save should succeed");

    let loaded = store
        .load(record.identifier())
        .await
        .expect("load should succeed")
        .expect("record should exist");
    assert_eq!(loaded, record);

    let order: Vec<(&str, &serde_json::Value)> = loaded.field_values().iter().collect();
    let expected: Vec<(&str, &serde_json::Value)> = record.field_values().iter().collect();
    assert_eq!(order, expected);

    let bulk = store
        .load_field_values(&ids(&["IBM US Equity", "NOT CACHED"]))
        .await
        .expect("bulk load should succeed");
    assert_eq!(bulk.len(), 1);
    assert!(!bulk.contains_key("NOT CACHED"));

    let mut replacement = ReferenceData::new("IBM US Equity");
    replacement.add_field_value("PX_LAST", json!(1));
    store.save_field_values(&replacement).await.expect("save should succeed");
    assert_eq!(
        store.load("IBM US Equity").await.expect("load should succeed"),
        Some(replacement)
    );

    store
        .save_invalid_fields("IBM US Equity", &ids(&["BOGUS", "JUNK"]))
        .await
        .expect("save should succeed");
    let invalid = store
        .load_invalid_fields(&ids(&["IBM US Equity", "NOT CACHED"]))
        .await
        .expect("load should succeed");
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid.get("IBM US Equity"), Some(&ids(&["BOGUS", "JUNK"])));
}

#[tokio::test]
async fn test_in_memory_round_trip() {
    assert_round_trip(&InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_lmdb_round_trip() {
    let dir = TempDir::new().expect("tempdir should be created");
    let store = LmdbStore::new(dir.path(), 10).expect("store should open");
    assert_round_trip(&store).await;
}

#[tokio::test]
async fn test_document_round_trip() {
    assert_round_trip(&DocumentStore::in_memory(&DocumentSettings::default())).await;
}

#[tokio::test]
async fn test_lmdb_store_from_settings_serves_cache() {
    let dir = TempDir::new().expect("tempdir should be created");
    let settings = CacheSettings::new().with_lmdb(dir.path().join("cache"), 10);
    settings.validate().expect("settings should validate");

    let store = Arc::new(LmdbStore::from_settings(&settings.lmdb).expect("store should open"));
    let upstream = Arc::new(equity_upstream(&["SEC1"]));
    let cache = ValueCachingProvider::new(upstream.clone(), store.clone(), settings);
    let request = cached_request(&["SEC1"], &["TICKER", "PX_BID"]);

    let first = cache.get_reference_data(&request).await.expect("call should succeed");
    let second = cache.get_reference_data(&request).await.expect("call should succeed");

    assert_eq!(first, second);
    assert_eq!(upstream.call_count(), 1);
    assert_eq!(store.identifiers().await.expect("listing should succeed"), vec!["SEC1".to_string()]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The LMDB encoding preserves every record exactly.
    #[test]
    fn prop_lmdb_encoding_preserves_records(record in arb_reference_data()) {
        let bytes = encode_record(&record, chrono::Utc::now()).expect("encode should succeed");
        let (decoded, _) = decode_record(record.identifier(), &bytes).expect("decode should succeed");
        prop_assert_eq!(decoded, record);
    }

    /// The document encoding preserves every record, reserved field names
    /// included.
    #[test]
    fn prop_document_encoding_preserves_records(record in arb_reference_data()) {
        let document = encode_document(&record, chrono::Utc::now()).expect("encode should succeed");
        let decoded = decode_document(&document).expect("decode should succeed");
        prop_assert_eq!(decoded, record);
    }

    /// Arbitrary bytes never panic the LMDB decoder.
    #[test]
    fn prop_lmdb_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_record("SEC1", &bytes);
    }
}
