//! Fuzz test for the document decoder
//!
//! Parses arbitrary bytes as JSON and hands any document to the decoder,
//! which must reject malformed shapes with an error and never panic. Any
//! record it accepts must encode again and decode to the same record.
//!
//! Run with: cargo +nightly fuzz run document_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use refdata_cache::backend::document::{
    decode_document, decode_invalid_fields_document, encode_document,
};

fuzz_target!(|data: &[u8]| {
    let Ok(document) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    if let Ok(record) = decode_document(&document) {
        let encoded = encode_document(&record, chrono::Utc::now()).expect("decoded record should encode");
        let again = decode_document(&encoded).expect("re-encoded record should decode");
        assert_eq!(again, record);
    }
    let _ = decode_invalid_fields_document(&document);
});
