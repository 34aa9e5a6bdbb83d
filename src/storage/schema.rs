//! Table layout of the target database
//!
//! Column order here is the order of fields in staged files. Primary keys
//! are added after loading, except for `user`, which is keyed up front so
//! duplicate first-sight rows from parallel processors are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Namespaces,
    Page,
    Revision,
    RevisionHash,
    User,
    Logging,
    Block,
    UserNew,
    UserLevel,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Namespaces,
        Table::Page,
        Table::Revision,
        Table::RevisionHash,
        Table::User,
        Table::Logging,
        Table::Block,
        Table::UserNew,
        Table::UserLevel,
    ];

    pub fn name(&self) -> &'static str {
        self.schema().name
    }

    /// Whether loads into this table skip rows whose key already exists
    pub fn ignore_duplicates(&self) -> bool {
        self.schema().keyed_at_creation
    }

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Table::Namespaces => &NAMESPACES,
            Table::Page => &PAGE,
            Table::Revision => &REVISION,
            Table::RevisionHash => &REVISION_HASH,
            Table::User => &USER,
            Table::Logging => &LOGGING,
            Table::Block => &BLOCK,
            Table::UserNew => &USER_NEW,
            Table::UserLevel => &USER_LEVEL,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL dialect a statement is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    SmallInt,
    Int,
    UInt,
    Flag,
    Varchar(u16),
    Text,
    DateTime,
    Decimal,
}

impl ColumnType {
    fn render(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::Sqlite => match self {
                ColumnType::SmallInt | ColumnType::Int | ColumnType::UInt | ColumnType::Flag => {
                    "INTEGER".to_string()
                }
                ColumnType::Decimal => "REAL".to_string(),
                _ => "TEXT".to_string(),
            },
            Dialect::MySql => match self {
                ColumnType::SmallInt => "SMALLINT".to_string(),
                ColumnType::Int => "INT".to_string(),
                ColumnType::UInt => "INT UNSIGNED".to_string(),
                ColumnType::Flag => "TINYINT(1) UNSIGNED".to_string(),
                ColumnType::Varchar(len) => format!("VARCHAR({}) BINARY", len),
                ColumnType::Text => "TEXT".to_string(),
                ColumnType::DateTime => "DATETIME".to_string(),
                ColumnType::Decimal => "DECIMAL(15,1)".to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty, nullable: false }
}

const fn nullable(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty, nullable: true }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static str,
    pub keyed_at_creation: bool,
}

use ColumnType::*;

static NAMESPACES: TableSchema = TableSchema {
    name: "namespaces",
    columns: &[col("code", SmallInt), col("name", Varchar(50))],
    primary_key: "code",
    keyed_at_creation: false,
};

static PAGE: TableSchema = TableSchema {
    name: "page",
    columns: &[
        col("page_id", UInt),
        col("page_namespace", SmallInt),
        col("page_title", Varchar(255)),
        col("page_restrictions", Varchar(255)),
    ],
    primary_key: "page_id",
    keyed_at_creation: false,
};

static REVISION: TableSchema = TableSchema {
    name: "revision",
    columns: &[
        col("rev_id", UInt),
        col("rev_page", UInt),
        col("rev_user", Int),
        col("rev_timestamp", DateTime),
        col("rev_len", UInt),
        nullable("rev_parent_id", UInt),
        col("rev_is_redirect", Flag),
        col("rev_minor_edit", Flag),
        col("rev_fa", Flag),
        col("rev_flist", Flag),
        col("rev_ga", Flag),
        col("rev_comment", Text),
    ],
    primary_key: "rev_id",
    keyed_at_creation: false,
};

static REVISION_HASH: TableSchema = TableSchema {
    name: "revision_hash",
    columns: &[
        col("rev_id", UInt),
        col("rev_page", UInt),
        col("rev_user", Int),
        col("rev_hash", Varchar(64)),
    ],
    primary_key: "rev_id",
    keyed_at_creation: false,
};

static USER: TableSchema = TableSchema {
    name: "user",
    columns: &[col("user_id", Int), col("user_name", Varchar(255))],
    primary_key: "user_id",
    keyed_at_creation: true,
};

static LOGGING: TableSchema = TableSchema {
    name: "logging",
    columns: &[
        col("log_id", UInt),
        col("log_type", Varchar(32)),
        col("log_action", Varchar(32)),
        col("log_timestamp", DateTime),
        col("log_user", Int),
        col("log_username", Varchar(255)),
        col("log_namespace", Int),
        col("log_title", Varchar(255)),
        col("log_comment", Text),
        col("log_params", Text),
        col("log_new_flag", UInt),
        col("log_old_flag", UInt),
    ],
    primary_key: "log_id",
    keyed_at_creation: false,
};

static BLOCK: TableSchema = TableSchema {
    name: "block",
    columns: &[
        col("block_id", UInt),
        col("block_action", Varchar(32)),
        col("block_user", Int),
        col("block_timestamp", DateTime),
        col("block_target", Varchar(255)),
        col("block_ip", UInt),
        col("block_duration", Decimal),
    ],
    primary_key: "block_id",
    keyed_at_creation: false,
};

static USER_NEW: TableSchema = TableSchema {
    name: "user_new",
    columns: &[
        col("user_log_id", UInt),
        col("user_id", Int),
        col("user_name", Varchar(255)),
        col("user_timestamp", DateTime),
        col("user_action", Varchar(32)),
    ],
    primary_key: "user_log_id",
    keyed_at_creation: false,
};

static USER_LEVEL: TableSchema = TableSchema {
    name: "user_level",
    columns: &[
        col("level_log_id", UInt),
        col("level_granter_id", Int),
        col("level_username", Varchar(255)),
        col("level_timestamp", DateTime),
        col("level_old", Varchar(255)),
        col("level_new", Varchar(255)),
    ],
    primary_key: "level_log_id",
    keyed_at_creation: false,
};

/// Backtick or double-quote an identifier (`user` is reserved in MySQL)
pub fn quote_ident(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Sqlite => format!("\"{}\"", name),
        Dialect::MySql => format!("`{}`", name),
    }
}

impl TableSchema {
    pub fn drop_statement(&self, dialect: Dialect) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(self.name, dialect))
    }

    pub fn create_statement(&self, dialect: Dialect) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{} {}{}",
                    quote_ident(c.name, dialect),
                    c.ty.render(dialect),
                    if c.nullable { " DEFAULT NULL" } else { " NOT NULL" }
                )
            })
            .collect();
        if self.keyed_at_creation {
            defs.push(format!("PRIMARY KEY ({})", quote_ident(self.primary_key, dialect)));
        }

        let engine = match dialect {
            Dialect::MySql => " ENGINE=MyISAM DEFAULT CHARSET=utf8mb4",
            Dialect::Sqlite => "",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}){}",
            quote_ident(self.name, dialect),
            defs.join(", "),
            engine
        )
    }

    /// Statement adding the primary key after loading, if not keyed already
    pub fn index_statement(&self, dialect: Dialect) -> Option<String> {
        if self.keyed_at_creation {
            return None;
        }
        let statement = match dialect {
            Dialect::Sqlite => format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("pk_{}", self.name), dialect),
                quote_ident(self.name, dialect),
                quote_ident(self.primary_key, dialect)
            ),
            Dialect::MySql => format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                quote_ident(self.name, dialect),
                quote_ident(self.primary_key, dialect)
            ),
        };
        Some(statement)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_columns_in_staged_order() {
        let names: Vec<_> = Table::Revision.schema().columns.iter().map(|c| c.name).collect();
        assert_eq!(names[0], "rev_id");
        assert_eq!(names[5], "rev_parent_id");
        assert_eq!(names[11], "rev_comment");
        assert_eq!(Table::Revision.schema().column_count(), 12);
    }

    #[test]
    fn test_sqlite_create_statement() {
        let sql = Table::Page.schema().create_statement(Dialect::Sqlite);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"page\" (\"page_id\" INTEGER NOT NULL, \
             \"page_namespace\" INTEGER NOT NULL, \"page_title\" TEXT NOT NULL, \
             \"page_restrictions\" TEXT NOT NULL)"
        );
    }

    #[test]
    fn test_user_table_is_keyed_at_creation() {
        assert!(Table::User.ignore_duplicates());
        assert!(!Table::Revision.ignore_duplicates());
        let sql = Table::User.schema().create_statement(Dialect::MySql);
        assert!(sql.contains("PRIMARY KEY (`user_id`)"));
        assert!(Table::User.schema().index_statement(Dialect::MySql).is_none());
    }

    #[test]
    fn test_index_statements() {
        assert_eq!(
            Table::Logging.schema().index_statement(Dialect::MySql).unwrap(),
            "ALTER TABLE `logging` ADD PRIMARY KEY (`log_id`)"
        );
        assert_eq!(
            Table::Block.schema().index_statement(Dialect::Sqlite).unwrap(),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"pk_block\" ON \"block\" (\"block_id\")"
        );
    }

    #[test]
    fn test_nullable_parent_column() {
        let sql = Table::Revision.schema().create_statement(Dialect::MySql);
        assert!(sql.contains("`rev_parent_id` INT UNSIGNED DEFAULT NULL"));
    }
}
