//! Error types for reference-data operations

use thiserror::Error;

/// Backend store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Read failed on {backend}: {reason}")]
    ReadFailed { backend: String, reason: String },

    #[error("Write failed on {backend} for {identifier}: {reason}")]
    WriteFailed {
        backend: String,
        identifier: String,
        reason: String,
    },

    #[error("Codec error for {identifier}: {reason}")]
    Codec { identifier: String, reason: String },

    #[error("Backend error on {backend}: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised by the upstream reference-data provider.
///
/// These are never caught by the caching layer; they reach the caller as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Upstream {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Upstream {provider} request limit reached")]
    LimitReached { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Request must contain at least one identifier")]
    EmptyIdentifiers,

    #[error("Identifiers must not be blank")]
    BlankIdentifier,

    #[error("Field names must not be blank")]
    BlankField,

    #[error("Invalid shard {shard_index} of {shard_count}")]
    InvalidShard { shard_index: u32, shard_count: u32 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the reference-data crates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefDataError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for reference-data operations.
pub type RefDataResult<T> = Result<T, RefDataError>;

// =============================================================================
// TESTS
// =============================================================================
