//! Binary record format for the LMDB store.
//!
//! Format: `[saved-at millis: 8 bytes LE][JSON body]`. The JSON body keeps
//! field values as an ordered list of `[name, value]` pairs so repeated
//! names survive, and lists not-available fields separately from values.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use refdata_core::{FieldValues, ReferenceData, ReferenceDataError, StorageError};
use serde::{Deserialize, Serialize};

const TIMESTAMP_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    identifier: String,
    fields: FieldValues,
    #[serde(default)]
    not_available: BTreeSet<String>,
    #[serde(default)]
    errors: Vec<ReferenceDataError>,
}

/// Encode a record with the time it was saved.
pub fn encode_record(record: &ReferenceData, saved_at: DateTime<Utc>) -> Result<Vec<u8>, StorageError> {
    let body = StoredRecord {
        identifier: record.identifier().to_string(),
        fields: record.field_values().clone(),
        not_available: record.not_available().clone(),
        errors: record.errors().to_vec(),
    };
    let json = serde_json::to_vec(&body).map_err(|e| StorageError::Codec {
        identifier: record.identifier().to_string(),
        reason: e.to_string(),
    })?;

    let mut bytes = Vec::with_capacity(TIMESTAMP_LEN + json.len());
    bytes.extend_from_slice(&saved_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode bytes written by [`encode_record`].
///
/// `key` names the record in errors. Malformed input yields
/// [`StorageError::Codec`] and never panics.
pub fn decode_record(key: &str, bytes: &[u8]) -> Result<(ReferenceData, DateTime<Utc>), StorageError> {
    let codec = |reason: String| StorageError::Codec {
        identifier: key.to_string(),
        reason,
    };

    if bytes.len() < TIMESTAMP_LEN {
        return Err(codec(format!("record is {} bytes, shorter than its header", bytes.len())));
    }
    let (header, json) = bytes.split_at(TIMESTAMP_LEN);
    let mut millis = [0u8; TIMESTAMP_LEN];
    millis.copy_from_slice(header);
    let saved_at = DateTime::from_timestamp_millis(i64::from_le_bytes(millis))
        .ok_or_else(|| codec("timestamp out of range".to_string()))?;

    let body: StoredRecord = serde_json::from_slice(json).map_err(|e| codec(e.to_string()))?;

    let mut record = ReferenceData::with_values(body.identifier, body.fields);
    for field in body.not_available {
        record.mark_not_available(field);
    }
    for error in body.errors {
        record.add_error(error);
    }
    Ok((record, saved_at))
}

/// Encode an invalid-field set.
pub fn encode_invalid_fields(identifier: &str, fields: &BTreeSet<String>) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(fields).map_err(|e| StorageError::Codec {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })
}

/// Decode bytes written by [`encode_invalid_fields`].
pub fn decode_invalid_fields(identifier: &str, bytes: &[u8]) -> Result<BTreeSet<String>, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Codec {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })
}
