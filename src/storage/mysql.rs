//! MySQL backend using server-side `LOAD DATA INFILE`
//!
//! Staged files must be readable by the MySQL server under the same path,
//! which means running on the database host with `secure_file_priv`
//! allowing the staging directory.

use super::schema::{quote_ident, Dialect, Table};
use super::{SchemaMode, Storage, StorageError};
use crate::types::NamespaceTable;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    async fn has_primary_key(&self, table: Table) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND table_name = ? AND index_name = 'PRIMARY'",
        )
        .bind(table.name())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

/// `LOAD DATA` statement matching the staged-file encoding
pub fn load_statement(table: Table, staged: &Path) -> String {
    let path = staged.to_string_lossy().replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "LOAD DATA INFILE '{}' {}INTO TABLE {} CHARACTER SET utf8mb4 \
         FIELDS TERMINATED BY '\\t' OPTIONALLY ENCLOSED BY '\"' ESCAPED BY '\"' \
         LINES TERMINATED BY '\\n'",
        path,
        if table.ignore_duplicates() { "IGNORE " } else { "" },
        quote_ident(table.name(), Dialect::MySql)
    )
}

#[async_trait]
impl Storage for MySqlStorage {
    async fn prepare_schema(&self, mode: SchemaMode) -> Result<(), StorageError> {
        for table in Table::ALL {
            let schema = table.schema();
            if mode == SchemaMode::Create {
                sqlx::query(&schema.drop_statement(Dialect::MySql))
                    .execute(&self.pool)
                    .await?;
            }
            sqlx::query(&schema.create_statement(Dialect::MySql))
                .execute(&self.pool)
                .await?;
        }
        info!("MySQL schema ready ({:?})", mode);
        Ok(())
    }

    async fn insert_namespaces(&self, namespaces: &NamespaceTable) -> Result<(), StorageError> {
        let table = quote_ident(Table::Namespaces.name(), Dialect::MySql);
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
        let staged = std::fs::canonicalize(staged)?;
        let statement = load_statement(table, &staged);
        // LOAD DATA is not allowed as a prepared statement
        let result = sqlx::raw_sql(&statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn build_indexes(&self) -> Result<(), StorageError> {
        for table in Table::ALL {
            let Some(statement) = table.schema().index_statement(Dialect::MySql) else {
                continue;
            };
            if self.has_primary_key(table).await? {
                debug!("{} already has a primary key", table);
                continue;
            }
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!("MySQL primary keys built");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_statement() {
        let sql = load_statement(Table::Revision, Path::new("/tmp/line0_revision.tsv"));
        assert_eq!(
            sql,
            "LOAD DATA INFILE '/tmp/line0_revision.tsv' INTO TABLE `revision` CHARACTER SET utf8mb4 \
             FIELDS TERMINATED BY '\\t' OPTIONALLY ENCLOSED BY '\"' ESCAPED BY '\"' \
             LINES TERMINATED BY '\\n'"
        );
    }

    #[test]
    fn test_load_statement_for_user_ignores_duplicates() {
        let sql = load_statement(Table::User, Path::new("/tmp/o'brien/user.tsv"));
        assert!(sql.starts_with("LOAD DATA INFILE '/tmp/o\\'brien/user.tsv' IGNORE INTO TABLE `user`"));
    }
}
