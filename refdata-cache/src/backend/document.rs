//! Document-database store.
//!
//! Records are kept as JSON documents in two collections:
//!
//! ```text
//! field values:   {"_id": "SEC1",
//!                  "fieldData": [{"name": "PX_LAST", "value": 101.2},
//!                                {"name": "NOT_AVAILABLE_FIELD", "value": "PX_BID"}],
//!                  "errors": [...],
//!                  "lastUpdated": "2026-10-18T09:00:00Z"}
//! invalid fields: {"_id": "SEC1", "fields": ["FOO"]}
//! ```
//!
//! Not-available fields ride inline in `fieldData` under the reserved name
//! [`NOT_AVAILABLE_FIELD`]. A real field carrying that name, or any name
//! starting with a backslash, is stored with one extra leading backslash so
//! every field name survives the round trip. The collection itself sits
//! behind [`DocumentCollection`] so any JSON document database can back the
//! store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refdata_core::{
    DocumentSettings, FieldValue, RefDataError, RefDataResult, ReferenceData, ReferenceDataError,
    StorageError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::{FieldValueStore, InvalidFieldStore};

/// Reserved entry name marking a field as not available.
pub const NOT_AVAILABLE_FIELD: &str = "NOT_AVAILABLE_FIELD";

const ESCAPE_PREFIX: char = '\\';

fn escape_name(name: &str) -> String {
    if name == NOT_AVAILABLE_FIELD || name.starts_with(ESCAPE_PREFIX) {
        format!("{ESCAPE_PREFIX}{name}")
    } else {
        name.to_string()
    }
}

fn unescape_name(name: String) -> String {
    match name.strip_prefix(ESCAPE_PREFIX) {
        Some(original) => original.to_string(),
        None => name,
    }
}

/// Error type for document collection operations.
#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    /// The underlying database failed.
    #[error("Document backend error on {collection}: {reason}")]
    Backend { collection: String, reason: String },

    /// The collection's lock was poisoned by a panicking writer.
    #[error("Document collection lock poisoned")]
    LockPoisoned,
}

impl From<DocumentStoreError> for StorageError {
    fn from(e: DocumentStoreError) -> Self {
        match e {
            DocumentStoreError::Backend { collection, reason } => StorageError::Backend {
                backend: format!("document:{collection}"),
                reason,
            },
            DocumentStoreError::LockPoisoned => StorageError::LockPoisoned,
        }
    }
}

impl From<DocumentStoreError> for RefDataError {
    fn from(e: DocumentStoreError) -> Self {
        RefDataError::Storage(e.into())
    }
}

/// A collection of JSON documents keyed by `_id`.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name, for logs and errors.
    fn name(&self) -> &str;

    /// Documents whose `_id` is in `ids`. Missing ids are skipped.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Value>, DocumentStoreError>;

    /// Insert or replace the document with the given `_id`.
    async fn upsert(&self, id: &str, document: Value) -> Result<(), DocumentStoreError>;

    /// Every `_id` in the collection, sorted.
    async fn ids(&self) -> Result<Vec<String>, DocumentStoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldEntry {
    name: String,
    value: FieldValue,
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldValueDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "fieldData", default)]
    field_data: Vec<FieldEntry>,
    #[serde(default)]
    errors: Vec<ReferenceDataError>,
    #[serde(rename = "lastUpdated")]
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InvalidFieldDocument {
    #[serde(rename = "_id")]
    id: String,
    fields: BTreeSet<String>,
}

/// Build the field-value document for a record.
pub fn encode_document(record: &ReferenceData, saved_at: DateTime<Utc>) -> Result<Value, StorageError> {
    let codec = |reason: String| StorageError::Codec {
        identifier: record.identifier().to_string(),
        reason,
    };

    let mut field_data: Vec<FieldEntry> = record
        .field_values()
        .iter()
        .map(|(name, value)| FieldEntry {
            name: escape_name(name),
            value: value.clone(),
        })
        .collect();
    field_data.extend(record.not_available().iter().map(|field| FieldEntry {
        name: NOT_AVAILABLE_FIELD.to_string(),
        value: Value::String(field.clone()),
    }));

    let document = FieldValueDocument {
        id: record.identifier().to_string(),
        field_data,
        errors: record.errors().to_vec(),
        last_updated: saved_at,
    };
    serde_json::to_value(&document).map_err(|e| codec(e.to_string()))
}

/// Rebuild a record from its field-value document.
pub fn decode_document(document: &Value) -> Result<ReferenceData, StorageError> {
    let id_hint = document
        .get("_id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string();
    let codec = |reason: String| StorageError::Codec {
        identifier: id_hint.clone(),
        reason,
    };

    let parsed: FieldValueDocument =
        serde_json::from_value(document.clone()).map_err(|e| codec(e.to_string()))?;

    let mut record = ReferenceData::new(parsed.id);
    let mut not_available = Vec::new();
    for entry in parsed.field_data {
        if entry.name == NOT_AVAILABLE_FIELD {
            match entry.value {
                Value::String(field) => not_available.push(field),
                other => {
                    return Err(codec(format!(
                        "{NOT_AVAILABLE_FIELD} entry must name a field, found {other}"
                    )))
                }
            }
        } else {
            record.add_field_value(unescape_name(entry.name), entry.value);
        }
    }
    for field in not_available {
        record.mark_not_available(field);
    }
    for error in parsed.errors {
        record.add_error(error);
    }
    Ok(record)
}

/// Build the invalid-field document for an identifier.
pub fn encode_invalid_fields_document(
    identifier: &str,
    fields: &BTreeSet<String>,
) -> Result<Value, StorageError> {
    serde_json::to_value(InvalidFieldDocument {
        id: identifier.to_string(),
        fields: fields.clone(),
    })
    .map_err(|e| StorageError::Codec {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an invalid-field document into `(identifier, fields)`.
pub fn decode_invalid_fields_document(
    document: &Value,
) -> Result<(String, BTreeSet<String>), StorageError> {
    let parsed: InvalidFieldDocument =
        serde_json::from_value(document.clone()).map_err(|e| StorageError::Codec {
            identifier: document
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string(),
            reason: e.to_string(),
        })?;
    Ok((parsed.id, parsed.fields))
}

/// Field-value and invalid-field store over two document collections.
pub struct DocumentStore<C> {
    field_values: C,
    invalid_fields: C,
}

impl<C: DocumentCollection> DocumentStore<C> {
    pub fn new(field_values: C, invalid_fields: C) -> Self {
        Self {
            field_values,
            invalid_fields,
        }
    }

    pub fn field_value_collection(&self) -> &C {
        &self.field_values
    }

    pub fn invalid_field_collection(&self) -> &C {
        &self.invalid_fields
    }
}

impl DocumentStore<InMemoryDocumentCollection> {
    /// In-memory document store with collections named from settings.
    pub fn in_memory(settings: &DocumentSettings) -> Self {
        Self::new(
            InMemoryDocumentCollection::new(settings.field_value_collection.clone()),
            InMemoryDocumentCollection::new(settings.invalid_field_collection.clone()),
        )
    }
}

fn id_list(identifiers: &BTreeSet<String>) -> Vec<String> {
    identifiers.iter().cloned().collect()
}

#[async_trait]
impl<C: DocumentCollection> FieldValueStore for DocumentStore<C> {
    async fn load_field_values(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, ReferenceData>> {
        let documents = self.field_values.find_by_ids(&id_list(identifiers)).await?;

        let mut loaded = HashMap::with_capacity(documents.len());
        for document in &documents {
            let record = decode_document(document)?;
            loaded.insert(record.identifier().to_string(), record);
        }
        Ok(loaded)
    }

    async fn save_field_values(&self, record: &ReferenceData) -> RefDataResult<()> {
        let document = encode_document(record, Utc::now())?;
        self.field_values
            .upsert(record.identifier(), document)
            .await?;
        Ok(())
    }

    async fn identifiers(&self) -> RefDataResult<Vec<String>> {
        Ok(self.field_values.ids().await?)
    }
}

#[async_trait]
impl<C: DocumentCollection> InvalidFieldStore for DocumentStore<C> {
    async fn load_invalid_fields(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, BTreeSet<String>>> {
        let documents = self.invalid_fields.find_by_ids(&id_list(identifiers)).await?;

        let mut loaded = HashMap::with_capacity(documents.len());
        for document in &documents {
            let (identifier, fields) = decode_invalid_fields_document(document)?;
            loaded.insert(identifier, fields);
        }
        Ok(loaded)
    }

    async fn save_invalid_fields(
        &self,
        identifier: &str,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<()> {
        let document = encode_invalid_fields_document(identifier, fields)?;
        self.invalid_fields.upsert(identifier, document).await?;
        Ok(())
    }
}

/// Document collection held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentCollection {
    name: String,
    documents: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryDocumentCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Raw document for `id`.
    pub fn get(&self, id: &str) -> Result<Option<Value>, DocumentStoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| DocumentStoreError::LockPoisoned)?;
        Ok(documents.get(id).cloned())
    }
}

#[async_trait]
impl DocumentCollection for InMemoryDocumentCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Value>, DocumentStoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| DocumentStoreError::LockPoisoned)?;
        Ok(ids.iter().filter_map(|id| documents.get(id).cloned()).collect())
    }

    async fn upsert(&self, id: &str, document: Value) -> Result<(), DocumentStoreError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| DocumentStoreError::LockPoisoned)?;
        documents.insert(id.to_string(), document);
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<String>, DocumentStoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| DocumentStoreError::LockPoisoned)?;
        Ok(documents.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_shape() {
        let mut record = ReferenceData::new("SEC1");
        record.add_field_value("PX_LAST", json!(101.2));
        record.mark_not_available("PX_BID");

        let saved_at = DateTime::from_timestamp_millis(0).expect("valid timestamp");
        let document = encode_document(&record, saved_at).expect("encode should succeed");

        assert_eq!(document["_id"], json!("SEC1"));
        assert_eq!(
            document["fieldData"],
            json!([
                {"name": "PX_LAST", "value": 101.2},
                {"name": "NOT_AVAILABLE_FIELD", "value": "PX_BID"}
            ])
        );
        assert_eq!(document["errors"], json!([]));
        assert!(document["lastUpdated"].is_string());
    }

    #[test]
    fn test_document_keeps_repeated_fields_in_order() {
        let mut record = ReferenceData::new("SEC1");
        record.add_field_value("ALIAS", json!("A"));
        record.add_field_value("NAME", json!("Acme"));
        record.add_field_value("ALIAS", json!("B"));

        let document = encode_document(&record, Utc::now()).expect("encode should succeed");
        let decoded = decode_document(&document).expect("decode should succeed");

        assert_eq!(decoded, record);
        let aliases: Vec<_> = decoded.field_values().get_all("ALIAS").collect();
        assert_eq!(aliases, vec![&json!("A"), &json!("B")]);
    }

    #[test]
    fn test_reserved_field_name_round_trips() {
        let mut record = ReferenceData::new("SEC1");
        record.add_field_value(NOT_AVAILABLE_FIELD, json!("x"));
        record.add_field_value("\\PATH", json!("y"));
        record.mark_not_available("PX_BID");

        let document = encode_document(&record, Utc::now()).expect("encode should succeed");
        assert_eq!(
            document["fieldData"],
            json!([
                {"name": "\\NOT_AVAILABLE_FIELD", "value": "x"},
                {"name": "\\\\PATH", "value": "y"},
                {"name": "NOT_AVAILABLE_FIELD", "value": "PX_BID"}
            ])
        );

        let decoded = decode_document(&document).expect("decode should succeed");
        assert_eq!(decoded, record);
        assert_eq!(decoded.slot("PX_BID"), refdata_core::FieldSlot::KnownUnavailable);
    }

    #[test]
    fn test_malformed_documents_are_codec_errors() {
        assert!(matches!(
            decode_document(&json!({"_id": "SEC1"})),
            Err(StorageError::Codec { ref identifier, .. }) if identifier == "SEC1"
        ));
        assert!(decode_document(&json!([1, 2])).is_err());
        assert!(decode_document(&json!({
            "_id": "SEC1",
            "fieldData": [{"name": "NOT_AVAILABLE_FIELD", "value": 3}],
            "lastUpdated": "2026-10-18T09:00:00Z"
        }))
        .is_err());
        assert!(decode_invalid_fields_document(&json!({"_id": "SEC1"})).is_err());
    }

    #[tokio::test]
    async fn test_store_round_trip_through_collections() {
        let store = DocumentStore::in_memory(&DocumentSettings::default());
        let mut record = ReferenceData::new("SEC1");
        record.add_field_value("PX_LAST", json!(5));
        record.mark_not_available("PX_ASK");
        record.add_error(ReferenceDataError::for_field("FOO", 9, "BAD_FLD", "Field not valid"));

        store.save_field_values(&record).await.expect("save should succeed");
        let bad: BTreeSet<String> = ["FOO".to_string()].into_iter().collect();
        store
            .save_invalid_fields("SEC1", &bad)
            .await
            .expect("save should succeed");

        assert_eq!(
            store.load("SEC1").await.expect("load should succeed"),
            Some(record)
        );
        let ids: BTreeSet<String> = ["SEC1".to_string(), "SEC2".to_string()].into_iter().collect();
        let invalid = store.load_invalid_fields(&ids).await.expect("load should succeed");
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid.get("SEC1"), Some(&bad));
        assert_eq!(store.field_value_collection().name(), "reference_data");
        assert!(store
            .invalid_field_collection()
            .get("SEC1")
            .expect("read should succeed")
            .is_some());
    }
}
