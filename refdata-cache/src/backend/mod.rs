//! Backend stores.
//!
//! - [`InMemoryStore`]: concurrent hash maps, for tests and short-lived processes
//! - [`LmdbStore`]: memory-mapped LMDB file on local disk
//! - [`DocumentStore`]: JSON documents in any [`DocumentCollection`]; with the
//!   `postgres` feature, [`PostgresDocumentCollection`] keeps them in JSONB tables

pub mod document;
pub mod lmdb;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod stored;

pub use document::{
    DocumentCollection, DocumentStore, DocumentStoreError, InMemoryDocumentCollection,
    NOT_AVAILABLE_FIELD,
};
pub use lmdb::{LmdbStore, LmdbStoreError};
pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresDocumentCollection, PostgresSettings};
