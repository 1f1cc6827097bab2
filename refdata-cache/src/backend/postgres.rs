//! PostgreSQL JSONB document collection.
//!
//! Each collection is a table `(id TEXT PRIMARY KEY, document JSONB, updated_at TIMESTAMPTZ)`.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use refdata_core::{is_valid_collection_name, ConfigError, RefDataResult};
use serde_json::Value;
use tokio_postgres::NoTls;

use super::document::{DocumentCollection, DocumentStoreError};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// PostgreSQL connection pool settings.
#[derive(Debug, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait for a pooled connection at most this long
    pub timeout: Duration,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "refdata".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PostgresSettings {
    /// Read settings from `REFDATA_DB_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("REFDATA_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("REFDATA_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("REFDATA_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("REFDATA_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("REFDATA_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("REFDATA_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: Duration::from_secs(
                std::env::var("REFDATA_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeout.as_secs()),
            ),
        }
    }

    /// Create a connection pool.
    pub fn create_pool(&self) -> RefDataResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_config = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_config.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ConfigError::InvalidValue {
                field: "postgres".to_string(),
                value: format!("{}:{}/{}", self.host, self.port, self.dbname),
                reason: e.to_string(),
            })?;
        Ok(pool)
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

/// A document collection stored in one PostgreSQL table.
#[derive(Clone)]
pub struct PostgresDocumentCollection {
    pool: Pool,
    table: String,
}

impl PostgresDocumentCollection {
    /// Bind a collection to `table`. The name is interpolated into SQL, so
    /// only `[a-z0-9_]` names are accepted.
    pub fn new(pool: Pool, table: impl Into<String>) -> RefDataResult<Self> {
        let table = table.into();
        if !is_valid_collection_name(&table) {
            return Err(ConfigError::InvalidValue {
                field: "collection".to_string(),
                value: table,
                reason: "collection names must be non-empty lowercase [a-z0-9_]".to_string(),
            }
            .into());
        }
        Ok(Self { pool, table })
    }

    fn backend_error(&self, e: impl std::fmt::Display) -> DocumentStoreError {
        DocumentStoreError::Backend {
            collection: self.table.clone(),
            reason: e.to_string(),
        }
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, DocumentStoreError> {
        self.pool.get().await.map_err(|e| self.backend_error(e))
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), DocumentStoreError> {
        let conn = self.conn().await?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id TEXT PRIMARY KEY, \
                document JSONB NOT NULL, \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            self.table
        );
        conn.batch_execute(&sql)
            .await
            .map_err(|e| self.backend_error(e))?;
        tracing::info!(table = %self.table, "Ensured document table");
        Ok(())
    }
}

#[async_trait]
impl DocumentCollection for PostgresDocumentCollection {
    fn name(&self) -> &str {
        &self.table
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Value>, DocumentStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn().await?;
        let sql = format!("SELECT document FROM {} WHERE id = ANY($1)", self.table);
        let rows = conn
            .query(sql.as_str(), &[&ids])
            .await
            .map_err(|e| self.backend_error(e))?;

        rows.iter()
            .map(|row| row.try_get::<_, Value>(0).map_err(|e| self.backend_error(e)))
            .collect()
    }

    async fn upsert(&self, id: &str, document: Value) -> Result<(), DocumentStoreError> {
        let conn = self.conn().await?;
        let sql = format!(
            "INSERT INTO {} (id, document, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()",
            self.table
        );
        conn.execute(sql.as_str(), &[&id, &document])
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<String>, DocumentStoreError> {
        let conn = self.conn().await?;
        let sql = format!("SELECT id FROM {} ORDER BY id", self.table);
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| self.backend_error(e))?;

        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(|e| self.backend_error(e)))
            .collect()
    }
}
