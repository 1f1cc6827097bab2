//! LMDB-backed store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cached records in a
//! memory-mapped file that survives restarts.
//!
//! # Layout
//!
//! Two named databases share one environment:
//! - `field_values`: identifier (UTF-8) to an encoded record (see [`stored`](super::stored))
//! - `invalid_fields`: identifier (UTF-8) to a JSON array of field names
//!
//! # Thread Safety
//!
//! Reads use LMDB read transactions and never block. Each save is its own
//! short write transaction; LMDB serializes writers internally.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use refdata_core::{LmdbSettings, RefDataError, RefDataResult, ReferenceData, StorageError};

use super::stored::{decode_invalid_fields, decode_record, encode_invalid_fields, encode_record};
use crate::traits::{FieldValueStore, InvalidFieldStore};

const FIELD_VALUES_DB: &str = "field_values";
const INVALID_FIELDS_DB: &str = "invalid_fields";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        StorageError::Backend {
            backend: "lmdb".to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<LmdbStoreError> for RefDataError {
    fn from(e: LmdbStoreError) -> Self {
        RefDataError::Storage(e.into())
    }
}

/// Persistent store on LMDB.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(LmdbStore::new("/var/cache/refdata", 1024)?);
/// let cache = ValueCachingProvider::with_defaults(upstream, store);
/// ```
pub struct LmdbStore {
    env: Env,
    field_values: Database<Bytes, Bytes>,
    invalid_fields: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open (creating if needed) a store in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Either database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let field_values: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(FIELD_VALUES_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let invalid_fields: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(INVALID_FIELDS_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        tracing::info!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB store");

        Ok(Self {
            env,
            field_values,
            invalid_fields,
        })
    }

    /// Open a store from settings.
    pub fn from_settings(settings: &LmdbSettings) -> Result<Self, LmdbStoreError> {
        Self::new(&settings.path, settings.max_size_mb)
    }

    fn put(&self, db: Database<Bytes, Bytes>, identifier: &str, bytes: &[u8]) -> RefDataResult<()> {
        let write_failed = |e: heed::Error| StorageError::WriteFailed {
            backend: "lmdb".to_string(),
            identifier: identifier.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(write_failed)?;
        db.put(&mut wtxn, identifier.as_bytes(), bytes)
            .map_err(write_failed)?;
        wtxn.commit().map_err(write_failed)?;
        Ok(())
    }
}

fn read_failed(e: heed::Error) -> StorageError {
    StorageError::ReadFailed {
        backend: "lmdb".to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl FieldValueStore for LmdbStore {
    async fn load_field_values(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, ReferenceData>> {
        let rtxn = self.env.read_txn().map_err(read_failed)?;

        let mut loaded = HashMap::new();
        for identifier in identifiers {
            if let Some(bytes) = self
                .field_values
                .get(&rtxn, identifier.as_bytes())
                .map_err(read_failed)?
            {
                let (record, _) = decode_record(identifier, bytes)?;
                loaded.insert(identifier.clone(), record);
            }
        }
        Ok(loaded)
    }

    async fn save_field_values(&self, record: &ReferenceData) -> RefDataResult<()> {
        let bytes = encode_record(record, Utc::now())?;
        self.put(self.field_values, record.identifier(), &bytes)
    }

    async fn identifiers(&self) -> RefDataResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(read_failed)?;

        let mut ids = Vec::new();
        for entry in self.field_values.iter(&rtxn).map_err(read_failed)? {
            let (key, _) = entry.map_err(read_failed)?;
            let identifier = std::str::from_utf8(key).map_err(|e| StorageError::Codec {
                identifier: String::from_utf8_lossy(key).into_owned(),
                reason: e.to_string(),
            })?;
            ids.push(identifier.to_string());
        }
        Ok(ids)
    }

    async fn entry_count(&self) -> RefDataResult<u64> {
        let rtxn = self.env.read_txn().map_err(read_failed)?;
        Ok(self.field_values.len(&rtxn).map_err(read_failed)?)
    }
}

#[async_trait]
impl InvalidFieldStore for LmdbStore {
    async fn load_invalid_fields(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> RefDataResult<HashMap<String, BTreeSet<String>>> {
        let rtxn = self.env.read_txn().map_err(read_failed)?;

        let mut loaded = HashMap::new();
        for identifier in identifiers {
            if let Some(bytes) = self
                .invalid_fields
                .get(&rtxn, identifier.as_bytes())
                .map_err(read_failed)?
            {
                loaded.insert(identifier.clone(), decode_invalid_fields(identifier, bytes)?);
            }
        }
        Ok(loaded)
    }

    async fn save_invalid_fields(
        &self,
        identifier: &str,
        fields: &BTreeSet<String>,
    ) -> RefDataResult<()> {
        let bytes = encode_invalid_fields(identifier, fields)?;
        self.put(self.invalid_fields, identifier, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_store() -> (LmdbStore, TempDir) {
        let dir = TempDir::new().expect("tempdir should be created");
        let store = LmdbStore::new(dir.path(), 10).expect("store should open");
        (store, dir)
    }

    #[tokio::test]
    async fn test_save_and_load_record() {
        let (store, _dir) = open_store();
        let mut record = ReferenceData::new("IBM US Equity");
        record.add_field_value("TICKER", json!("IBM"));
        record.add_field_value("TICKER", json!("IBM.N"));
        record.mark_not_available("PX_BID");

        store.save_field_values(&record).await.expect("save should succeed");

        let loaded = store
            .load("IBM US Equity")
            .await
            .expect("load should succeed")
            .expect("record should exist");
        assert_eq!(loaded, record);
        assert_eq!(store.entry_count().await.expect("count should succeed"), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().expect("tempdir should be created");
        {
            let store = LmdbStore::new(dir.path(), 10).expect("store should open");
            let bad: BTreeSet<String> = ["FOO".to_string()].into_iter().collect();
            store
                .save_field_values(&ReferenceData::new("SEC1"))
                .await
                .expect("save should succeed");
            store
                .save_invalid_fields("SEC1", &bad)
                .await
                .expect("save should succeed");
        }

        let store = LmdbStore::new(dir.path(), 10).expect("store should reopen");
        assert_eq!(
            store.identifiers().await.expect("listing should succeed"),
            vec!["SEC1".to_string()]
        );
        let ids: BTreeSet<String> = ["SEC1".to_string()].into_iter().collect();
        let invalid = store
            .load_invalid_fields(&ids)
            .await
            .expect("load should succeed");
        assert!(invalid.get("SEC1").is_some_and(|f| f.contains("FOO")));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_codec_error() {
        let (store, _dir) = open_store();
        store
            .put(store.field_values, "SEC1", b"junk")
            .expect("raw put should succeed");

        let err = store
            .load("SEC1")
            .await
            .expect_err("corrupt record should fail to load");
        assert!(matches!(err, RefDataError::Storage(StorageError::Codec { .. })));
    }

    #[test]
    fn test_error_conversion() {
        let err: RefDataError = LmdbStoreError::EnvOpen("denied".to_string()).into();
        assert!(matches!(
            err,
            RefDataError::Storage(StorageError::Backend { ref backend, .. }) if backend == "lmdb"
        ));
    }
}
