//! Reference Data Core - Data Types
//!
//! Pure data structures shared by the caching layer and its callers:
//! per-identifier records, bulk requests and results, the upstream provider
//! seam, the error taxonomy and configuration. No caching logic lives here.

pub mod config;
pub mod error;
pub mod field;
pub mod provider;
pub mod record;
pub mod request;

pub use config::{is_valid_collection_name, CacheSettings, DocumentSettings, LmdbSettings};
pub use error::{
    ConfigError, RefDataError, RefDataResult, StorageError, UpstreamError, ValidationError,
};
pub use field::{FieldSlot, FieldValue, FieldValues};
pub use provider::ReferenceDataProvider;
pub use record::{ReferenceData, ReferenceDataError, ENTITLEMENT_CATEGORY, INVALID_FIELD_CATEGORY};
pub use request::{ReferenceDataRequest, ReferenceDataResponse};
