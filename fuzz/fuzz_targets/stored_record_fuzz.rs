//! Fuzz test for the LMDB record decoder
//!
//! Feeds arbitrary bytes to the decoder to find panics. Anything it accepts
//! must encode again and decode to the same record.
//!
//! Run with: cargo +nightly fuzz run stored_record_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use refdata_cache::backend::stored::{decode_record, encode_record};

fuzz_target!(|data: &[u8]| {
    let Ok((record, saved_at)) = decode_record("FUZZ", data) else {
        return;
    };

    let bytes = encode_record(&record, saved_at).expect("decoded record should encode");
    let (again, again_at) = decode_record("FUZZ", &bytes).expect("re-encoded record should decode");
    assert_eq!(again, record);
    assert_eq!(again_at, saved_at);
});
