//! Reference Data Cache - Caching Decorators and Backend Stores
//!
//! Decorators that sit in front of an upstream [`ReferenceDataProvider`] and
//! remember what it returns:
//!
//! - [`ValueCachingProvider`]: answers (identifier, field) pairs from a
//!   [`FieldValueStore`] and fetches only what is missing, including the
//!   fact that a field has no value
//! - [`InvalidFieldCachingProvider`]: stops asking for fields the upstream
//!   rejected as invalid
//! - [`RefreshDriver`]: re-fetches cached records in batches and rewrites
//!   the ones that changed
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(LmdbStore::from_settings(&settings.lmdb)?);
//! let cache = ValueCachingProvider::new(upstream, store, settings);
//!
//! let request = ReferenceDataRequest::new(["IBM US Equity"], ["PX_LAST"], true)?;
//! let response = cache.get_reference_data(&request).await?;
//!
//! RefreshDriver::new(&cache).run(&RefreshSelection::All).await?;
//! ```

pub mod backend;
pub mod invalid_fields;
pub mod merge;
pub mod partition;
pub mod refresh;
pub mod traits;
pub mod value_cache;

pub use backend::{
    DocumentCollection, DocumentStore, DocumentStoreError, InMemoryDocumentCollection,
    InMemoryStore, LmdbStore, LmdbStoreError, NOT_AVAILABLE_FIELD,
};
#[cfg(feature = "postgres")]
pub use backend::{PostgresDocumentCollection, PostgresSettings};
pub use invalid_fields::InvalidFieldCachingProvider;
pub use merge::{combine, differs, strip};
pub use partition::{missing_fields, RequestPartition};
pub use refresh::{shard_of, RefreshDriver, RefreshSelection, RefreshSummary};
pub use traits::{CacheStats, FieldValueStore, InvalidFieldStore};
pub use value_cache::ValueCachingProvider;

pub use refdata_core::ReferenceDataProvider;
