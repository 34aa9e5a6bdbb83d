//! SQLite backend
//!
//! SQLite has no file-based bulk load, so staged files are parsed back and
//! inserted inside one transaction per file. A failed file leaves no rows
//! behind.

use super::schema::{quote_ident, Dialect, Table};
use super::{SchemaMode, Storage, StorageError};
use crate::load::staging::staged_rows;
use crate::types::NamespaceTable;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect to a database such as `sqlite://wikidat.db`, creating it if needed
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(600));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        debug!("Connected to {}", url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn prepare_schema(&self, mode: SchemaMode) -> Result<(), StorageError> {
        for table in Table::ALL {
            let schema = table.schema();
            if mode == SchemaMode::Create {
                sqlx::query(&schema.drop_statement(Dialect::Sqlite))
                    .execute(&self.pool)
                    .await?;
            }
            sqlx::query(&schema.create_statement(Dialect::Sqlite))
                .execute(&self.pool)
                .await?;
        }
        info!("SQLite schema ready ({:?})", mode);
        Ok(())
    }

    async fn insert_namespaces(&self, namespaces: &NamespaceTable) -> Result<(), StorageError> {
        let table = quote_ident(Table::Namespaces.name(), Dialect::Sqlite);
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
        for (code, name) in namespaces.iter() {
            sqlx::query(&format!("INSERT INTO {} VALUES (?, ?)", table))
                .bind(code)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn bulk_load(&self, table: Table, staged: &Path) -> Result<u64, StorageError> {
        let schema = table.schema();
        let width = schema.column_count();
        let verb = if table.ignore_duplicates() { "INSERT OR IGNORE" } else { "INSERT" };
        let sql = format!(
            "{} INTO {} VALUES ({})",
            verb,
            quote_ident(schema.name, Dialect::Sqlite),
            vec!["?"; width].join(", ")
        );

        let staged_error = |message: String| StorageError::Staged {
            path: staged.display().to_string(),
            message,
        };

        let rows = staged_rows(staged).map_err(|e| staged_error(e.to_string()))?;
        let mut tx = self.pool.begin().await?;
        let mut loaded = 0u64;
        for row in rows {
            let row = row.map_err(|e| staged_error(e.to_string()))?;
            if row.len() != width {
                return Err(staged_error(format!(
                    "row has {} fields, {} expects {}",
                    row.len(),
                    table,
                    width
                )));
            }
            let mut query = sqlx::query(&sql);
            for value in row {
                query = query.bind(value);
            }
            loaded += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(loaded)
    }

    async fn build_indexes(&self) -> Result<(), StorageError> {
        for table in Table::ALL {
            if let Some(statement) = table.schema().index_statement(Dialect::Sqlite) {
                debug!("Indexing {}", table);
                sqlx::query(&statement).execute(&self.pool).await?;
            }
        }
        info!("SQLite primary keys built");
        Ok(())
    }
}
