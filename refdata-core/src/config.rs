//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, RefDataResult};

/// LMDB disk cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmdbSettings {
    /// Directory holding the LMDB environment.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub max_size_mb: usize,
}

impl Default for LmdbSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("refdata-cache"),
            max_size_mb: 1024,
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSettings {
    /// Collection (table) holding field-value documents.
    pub field_value_collection: String,
    /// Collection (table) holding invalid-field documents.
    pub invalid_field_collection: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            field_value_collection: "reference_data".to_string(),
            invalid_field_collection: "reference_data_invalid_fields".to_string(),
        }
    }
}

/// Settings for the caching decorators and refresh driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum identifiers per upstream call.
    pub upstream_batch_size: usize,
    /// Identifiers loaded and refreshed per refresh batch.
    pub refresh_batch_size: usize,
    pub lmdb: LmdbSettings,
    pub documents: DocumentSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            upstream_batch_size: 500,
            refresh_batch_size: 200,
            lmdb: LmdbSettings::default(),
            documents: DocumentSettings::default(),
        }
    }
}

impl CacheSettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum identifiers per upstream call.
    pub fn with_upstream_batch_size(mut self, size: usize) -> Self {
        self.upstream_batch_size = size;
        self
    }

    /// Set the refresh batch size.
    pub fn with_refresh_batch_size(mut self, size: usize) -> Self {
        self.refresh_batch_size = size;
        self
    }

    /// Set the LMDB settings.
    pub fn with_lmdb(mut self, path: impl Into<PathBuf>, max_size_mb: usize) -> Self {
        self.lmdb = LmdbSettings {
            path: path.into(),
            max_size_mb,
        };
        self
    }

    /// Set the document collection names.
    pub fn with_collections(
        mut self,
        field_values: impl Into<String>,
        invalid_fields: impl Into<String>,
    ) -> Self {
        self.documents = DocumentSettings {
            field_value_collection: field_values.into(),
            invalid_field_collection: invalid_fields.into(),
        };
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `REFDATA_UPSTREAM_BATCH_SIZE`: identifiers per upstream call (default: 500)
    /// - `REFDATA_REFRESH_BATCH_SIZE`: identifiers per refresh batch (default: 200)
    /// - `REFDATA_LMDB_PATH`: LMDB directory (default: `refdata-cache`)
    /// - `REFDATA_LMDB_MAX_SIZE_MB`: LMDB map size (default: 1024)
    /// - `REFDATA_FIELD_VALUE_COLLECTION`: document collection (default: `reference_data`)
    /// - `REFDATA_INVALID_FIELD_COLLECTION`: document collection (default: `reference_data_invalid_fields`)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            upstream_batch_size: std::env::var("REFDATA_UPSTREAM_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.upstream_batch_size),
            refresh_batch_size: std::env::var("REFDATA_REFRESH_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.refresh_batch_size),
            lmdb: LmdbSettings {
                path: std::env::var("REFDATA_LMDB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.lmdb.path),
                max_size_mb: std::env::var("REFDATA_LMDB_MAX_SIZE_MB")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.lmdb.max_size_mb),
            },
            documents: DocumentSettings {
                field_value_collection: std::env::var("REFDATA_FIELD_VALUE_COLLECTION")
                    .unwrap_or(defaults.documents.field_value_collection),
                invalid_field_collection: std::env::var("REFDATA_INVALID_FIELD_COLLECTION")
                    .unwrap_or(defaults.documents.invalid_field_collection),
            },
        }
    }

    /// Validate the settings.
    ///
    /// Validates:
    /// - batch sizes > 0
    /// - LMDB path non-empty and map size > 0
    /// - collection names are non-empty `[a-z0-9_]` identifiers and distinct
    pub fn validate(&self) -> RefDataResult<()> {
        if self.upstream_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream_batch_size".to_string(),
                value: self.upstream_batch_size.to_string(),
                reason: "upstream_batch_size must be greater than 0".to_string(),
            }
            .into());
        }

        if self.refresh_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_batch_size".to_string(),
                value: self.refresh_batch_size.to_string(),
                reason: "refresh_batch_size must be greater than 0".to_string(),
            }
            .into());
        }

        if self.lmdb.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "lmdb.path".to_string(),
            }
            .into());
        }

        if self.lmdb.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lmdb.max_size_mb".to_string(),
                value: self.lmdb.max_size_mb.to_string(),
                reason: "max_size_mb must be greater than 0".to_string(),
            }
            .into());
        }

        for (field, name) in [
            (
                "documents.field_value_collection",
                &self.documents.field_value_collection,
            ),
            (
                "documents.invalid_field_collection",
                &self.documents.invalid_field_collection,
            ),
        ] {
            if !is_valid_collection_name(name) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: name.clone(),
                    reason: "collection names must be non-empty lowercase [a-z0-9_]".to_string(),
                }
                .into());
            }
        }

        if self.documents.field_value_collection == self.documents.invalid_field_collection {
            return Err(ConfigError::InvalidValue {
                field: "documents.invalid_field_collection".to_string(),
                value: self.documents.invalid_field_collection.clone(),
                reason: "must differ from field_value_collection".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Whether `name` is usable as a collection/table name.
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
