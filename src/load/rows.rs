//! Rows produced by processors and consumed by sinks

use super::staging::Value;
use crate::storage::Table;
use crate::types::RecordKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    pub page_id: u64,
    pub namespace: i32,
    pub title: String,
    pub restrictions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRow {
    pub rev_id: u64,
    pub page_id: u64,
    pub user_id: i64,
    pub timestamp: String,
    pub len: u64,
    pub parent_id: Option<u64>,
    pub redirect: bool,
    pub minor: bool,
    pub featured_article: bool,
    pub featured_list: bool,
    pub good_article: bool,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionHashRow {
    pub rev_id: u64,
    pub page_id: u64,
    pub user_id: i64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: i64,
    pub user_name: String,
}

/// Everything a single revision writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRows {
    pub revision: RevisionRow,
    pub hash: RevisionHashRow,
    /// Present the first time a processor sees a registered contributor
    pub user: Option<UserRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingRow {
    pub log_id: u64,
    pub log_type: String,
    pub action: String,
    pub timestamp: String,
    pub user_id: i64,
    pub username: String,
    pub namespace: i32,
    pub title: String,
    pub comment: String,
    pub params: String,
    pub new_flag: u64,
    pub old_flag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRow {
    pub log_id: u64,
    pub action: String,
    pub user_id: i64,
    pub timestamp: String,
    pub target: String,
    pub target_ip: u32,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUserRow {
    pub log_id: u64,
    pub user_id: i64,
    pub user_name: String,
    pub timestamp: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLevelRow {
    pub log_id: u64,
    pub granter_id: i64,
    pub username: String,
    pub timestamp: String,
    pub old_groups: String,
    pub new_groups: String,
}

/// Everything a single log item writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogItemRows {
    pub logging: LoggingRow,
    pub block: Option<BlockRow>,
    pub new_user: Option<NewUserRow>,
    pub user_level: Option<UserLevelRow>,
}

/// Payload of a processor → sink channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkItem {
    Page(PageRow),
    Revision(RevisionRows),
    LogItem(LogItemRows),
}

/// A table row ready for staging
pub type StagedRow<'a> = (Table, Vec<Value<'a>>);

impl SinkItem {
    pub fn kind(&self) -> RecordKind {
        match self {
            SinkItem::Page(_) => RecordKind::Page,
            SinkItem::Revision(_) => RecordKind::Revision,
            SinkItem::LogItem(_) => RecordKind::LogItem,
        }
    }

    /// Rows this item adds, in column order of each table
    pub fn staged_rows(&self) -> Vec<StagedRow<'_>> {
        match self {
            SinkItem::Page(row) => vec![(
                Table::Page,
                vec![
                    Value::UInt(row.page_id),
                    Value::Int(row.namespace.into()),
                    Value::Text(&row.title),
                    Value::Text(&row.restrictions),
                ],
            )],
            SinkItem::Revision(rows) => {
                let r = &rows.revision;
                let h = &rows.hash;
                let mut staged = vec![
                    (
                        Table::Revision,
                        vec![
                            Value::UInt(r.rev_id),
                            Value::UInt(r.page_id),
                            Value::Int(r.user_id),
                            Value::Text(&r.timestamp),
                            Value::UInt(r.len),
                            Value::from(r.parent_id),
                            Value::Bool(r.redirect),
                            Value::Bool(r.minor),
                            Value::Bool(r.featured_article),
                            Value::Bool(r.featured_list),
                            Value::Bool(r.good_article),
                            Value::Text(&r.comment),
                        ],
                    ),
                    (
                        Table::RevisionHash,
                        vec![
                            Value::UInt(h.rev_id),
                            Value::UInt(h.page_id),
                            Value::Int(h.user_id),
                            Value::Text(&h.hash),
                        ],
                    ),
                ];
                if let Some(user) = &rows.user {
                    staged.push((
                        Table::User,
                        vec![Value::Int(user.user_id), Value::Text(&user.user_name)],
                    ));
                }
                staged
            }
            SinkItem::LogItem(rows) => {
                let l = &rows.logging;
                let mut staged = vec![(
                    Table::Logging,
                    vec![
                        Value::UInt(l.log_id),
                        Value::Text(&l.log_type),
                        Value::Text(&l.action),
                        Value::Text(&l.timestamp),
                        Value::Int(l.user_id),
                        Value::Text(&l.username),
                        Value::Int(l.namespace.into()),
                        Value::Text(&l.title),
                        Value::Text(&l.comment),
                        Value::Text(&l.params),
                        Value::UInt(l.new_flag),
                        Value::UInt(l.old_flag),
                    ],
                )];
                if let Some(b) = &rows.block {
                    staged.push((
                        Table::Block,
                        vec![
                            Value::UInt(b.log_id),
                            Value::Text(&b.action),
                            Value::Int(b.user_id),
                            Value::Text(&b.timestamp),
                            Value::Text(&b.target),
                            Value::UInt(b.target_ip.into()),
                            Value::Float(b.duration_secs),
                        ],
                    ));
                }
                if let Some(n) = &rows.new_user {
                    staged.push((
                        Table::UserNew,
                        vec![
                            Value::UInt(n.log_id),
                            Value::Int(n.user_id),
                            Value::Text(&n.user_name),
                            Value::Text(&n.timestamp),
                            Value::Text(&n.action),
                        ],
                    ));
                }
                if let Some(u) = &rows.user_level {
                    staged.push((
                        Table::UserLevel,
                        vec![
                            Value::UInt(u.log_id),
                            Value::Int(u.granter_id),
                            Value::Text(&u.username),
                            Value::Text(&u.timestamp),
                            Value::Text(&u.old_groups),
                            Value::Text(&u.new_groups),
                        ],
                    ));
                }
                staged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_widths_match_schema() {
        let item = SinkItem::Revision(RevisionRows {
            revision: RevisionRow {
                rev_id: 1,
                page_id: 2,
                user_id: -1,
                timestamp: "2020-01-01 00:00:00".into(),
                len: 0,
                parent_id: None,
                redirect: false,
                minor: false,
                featured_article: false,
                featured_list: false,
                good_article: false,
                comment: String::new(),
            },
            hash: RevisionHashRow { rev_id: 1, page_id: 2, user_id: -1, hash: "x".into() },
            user: Some(UserRow { user_id: 3, user_name: "Carol".into() }),
        });
        let staged = item.staged_rows();
        assert_eq!(staged.len(), 3);
        for (table, values) in &staged {
            assert_eq!(values.len(), table.schema().column_count(), "width of {}", table);
        }
        assert_eq!(staged[0].1[5], Value::Null);
    }

    #[test]
    fn test_log_item_rows_follow_sub_facts() {
        let item = SinkItem::LogItem(LogItemRows {
            logging: LoggingRow {
                log_id: 9,
                log_type: "block".into(),
                action: "block".into(),
                timestamp: "2020-01-01 00:00:00".into(),
                user_id: 4,
                username: "Admin".into(),
                namespace: 2,
                title: "User:Vandal".into(),
                comment: String::new(),
                params: "1 day".into(),
                new_flag: 0,
                old_flag: 0,
            },
            block: Some(BlockRow {
                log_id: 9,
                action: "block".into(),
                user_id: 4,
                timestamp: "2020-01-01 00:00:00".into(),
                target: "Vandal".into(),
                target_ip: 0,
                duration_secs: 86400.0,
            }),
            new_user: None,
            user_level: None,
        });
        let tables: Vec<_> = item.staged_rows().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tables, vec![Table::Logging, Table::Block]);
        for (table, values) in item.staged_rows() {
            assert_eq!(values.len(), table.schema().column_count());
        }
    }
}
