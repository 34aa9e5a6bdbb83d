//! Relational storage behind the bulk loader
//!
//! The [`Storage`] trait covers the four things a run needs from the
//! database: schema setup, the namespace table, staged-file bulk loads and
//! post-load indexes. Each sink opens its own connection through
//! [`connect`].

pub mod mysql;
pub mod schema;
pub mod sqlite;

pub use mysql::MySqlStorage;
pub use schema::{Dialect, Table, TableSchema};
pub use sqlite::SqliteStorage;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::NamespaceTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Staged file {path}: {message}")]
    Staged { path: String, message: String },
}

/// What to do with tables that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMode {
    /// Drop and recreate every table
    Create,
    /// Keep existing tables and their rows
    Reuse,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn prepare_schema(&self, mode: SchemaMode) -> Result<(), StorageError>;

    /// Replace the contents of the `namespaces` table
    async fn insert_namespaces(&self, namespaces: &NamespaceTable) -> Result<(), StorageError>;

    /// Load every row of a staged file into `table`, returning the row count
    async fn bulk_load(&self, table: Table, staged: &Path) -> Result<u64, StorageError>;

    /// Add primary keys once all rows are in
    async fn build_indexes(&self) -> Result<(), StorageError>;
}

/// Open the configured backend
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    let storage: Arc<dyn Storage> = match config.backend {
        StorageBackend::Sqlite => Arc::new(SqliteStorage::connect(&config.url).await?),
        StorageBackend::Mysql => Arc::new(MySqlStorage::connect(&config.url).await?),
    };
    Ok(storage)
}
