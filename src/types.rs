//! Core record types shared by the decoder, the pipeline stages and the loader

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Namespace code assigned to log items that carry no title at all
pub const UNKNOWN_NAMESPACE: i32 = -1000;

/// Storage user id for anonymous (IP) contributors
pub const ANONYMOUS_USER_ID: i64 = 0;

/// Storage user id for revisions and log items without a contributor
pub const MISSING_USER_ID: i64 = -1;

// ============================================================================
// Record kinds
// ============================================================================

/// Discriminator for the three record kinds routed through a pipeline line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Page,
    Revision,
    LogItem,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Page, RecordKind::Revision, RecordKind::LogItem];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Revision => "revision",
            Self::LogItem => "logitem",
        }
    }

    /// Offset of this kind inside a line's channel block.
    ///
    /// Record channels take `0..3`, row channels `3..6`.
    pub fn channel_index(&self) -> u16 {
        match self {
            Self::Page => 0,
            Self::Revision => 1,
            Self::LogItem => 2,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Page(PageRecord),
    Revision(RevisionRecord),
    LogItem(LogItemRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Page(_) => RecordKind::Page,
            Record::Revision(_) => RecordKind::Revision,
            Record::LogItem(_) => RecordKind::LogItem,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Record::Page(p) => p.id,
            Record::Revision(r) => r.id,
            Record::LogItem(l) => l.id,
        }
    }
}

// ============================================================================
// Contributors
// ============================================================================

/// Author of a revision or log item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributorRef {
    /// Registered account
    Registered { id: u64, name: Option<String> },
    /// Edit made from an IP address
    Anonymous { ip: Option<String> },
    /// No contributor element, or one suppressed with `deleted`
    #[default]
    Missing,
}

impl ContributorRef {
    /// User id following the storage convention: registered id, 0 for
    /// anonymous, -1 for missing.
    pub fn user_id(&self) -> i64 {
        match self {
            ContributorRef::Registered { id, .. } => *id as i64,
            ContributorRef::Anonymous { .. } => ANONYMOUS_USER_ID,
            ContributorRef::Missing => MISSING_USER_ID,
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        match self {
            ContributorRef::Registered { name, .. } => name.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// Page / Revision / LogItem
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: u64,
    pub namespace: i32,
    pub title: String,
    pub restrictions: Option<String>,
}

/// Classification flags computed from revision text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationFlags {
    pub featured_article: bool,
    pub featured_list: bool,
    pub good_article: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub id: u64,
    pub page_id: u64,
    pub namespace: i32,
    pub contributor: ContributorRef,
    pub timestamp: String,
    /// Value of the `bytes` attribute on the text element, when present
    pub byte_len: Option<u64>,
    /// Id of the previous revision emitted for the same page
    pub parent_id: Option<u64>,
    pub minor: bool,
    pub comment: Option<String>,
    pub text: Option<String>,

    // Filled in by the revision processor
    pub redirect: bool,
    pub flags: Option<ClassificationFlags>,
    pub text_hash: Option<String>,
}

impl RevisionRecord {
    /// Revision with only the fields every revision must carry
    pub fn new(id: u64, page_id: u64, namespace: i32, timestamp: impl Into<String>) -> Self {
        Self {
            id,
            page_id,
            namespace,
            contributor: ContributorRef::Missing,
            timestamp: timestamp.into(),
            byte_len: None,
            parent_id: None,
            minor: false,
            comment: None,
            text: None,
            redirect: false,
            flags: None,
            text_hash: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_contributor(mut self, contributor: ContributorRef) -> Self {
        self.contributor = contributor;
        self
    }
}

/// Block facts derived from a `block` log item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDetails {
    /// Blocked user name, empty when the target is an IP address
    pub target: String,
    /// Blocked IPv4 address as an integer, 0 when the target is a user
    pub target_ip: u32,
    /// Block length in seconds
    pub duration_secs: f64,
}

/// Group membership change derived from a `rights` log item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsChange {
    pub username: String,
    pub old_groups: String,
    pub new_groups: String,
}

/// Sub-facts the log item processor attaches before building rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogDetails {
    /// Flagged-revision levels (new, old) for review approvals
    pub flagged: Option<(u64, u64)>,
    pub block: Option<BlockDetails>,
    pub new_user: bool,
    pub rights: Option<RightsChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogItemRecord {
    pub id: u64,
    pub log_type: Option<String>,
    pub action: Option<String>,
    pub timestamp: String,
    pub contributor: ContributorRef,
    pub namespace: i32,
    /// Full log title including the namespace prefix, empty when absent
    pub title: String,
    pub comment: Option<String>,
    pub params: Option<String>,

    // Filled in by the log item processor
    pub details: Option<LogDetails>,
}

impl LogItemRecord {
    pub fn new(id: u64, timestamp: impl Into<String>) -> Self {
        Self {
            id,
            log_type: None,
            action: None,
            timestamp: timestamp.into(),
            contributor: ContributorRef::Missing,
            namespace: UNKNOWN_NAMESPACE,
            title: String::new(),
            comment: None,
            params: None,
            details: None,
        }
    }

    /// Set type and action
    pub fn with_event(mut self, log_type: impl Into<String>, action: impl Into<String>) -> Self {
        self.log_type = Some(log_type.into());
        self.action = Some(action.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>, namespace: i32) -> Self {
        self.title = title.into();
        self.namespace = namespace;
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }
}

// ============================================================================
// Namespaces
// ============================================================================

/// Namespace codes declared in a dump's `siteinfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceTable {
    by_code: BTreeMap<i32, String>,
    by_name: HashMap<String, i32>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        let mut table = Self::default();
        table.insert(0, "");
        table
    }

    /// Register a namespace. Code 0 is always the unnamed main namespace.
    pub fn insert(&mut self, code: i32, name: impl Into<String>) {
        let name = if code == 0 { String::new() } else { name.into() };
        if let Some(previous) = self.by_code.insert(code, name.clone()) {
            self.by_name.remove(&previous);
        }
        self.by_name.insert(name, code);
    }

    pub fn name(&self, code: i32) -> Option<&str> {
        self.by_code.get(&code).map(String::as_str)
    }

    pub fn code(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.by_code.iter().map(|(code, name)| (*code, name.as_str()))
    }

    /// Resolve the namespace of a log title.
    ///
    /// A known prefix before the first `:` gives its code; no colon or an
    /// unknown prefix gives 0; an absent or empty title gives
    /// [`UNKNOWN_NAMESPACE`].
    pub fn resolve_title(&self, title: Option<&str>) -> i32 {
        let title = match title {
            Some(t) if !t.is_empty() => t,
            _ => return UNKNOWN_NAMESPACE,
        };
        match title.split_once(':') {
            Some((prefix, _)) if !prefix.is_empty() => self.code(prefix).unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn talk_table() -> NamespaceTable {
        let mut table = NamespaceTable::new();
        table.insert(1, "Talk");
        table
    }

    #[test]
    fn test_resolve_known_prefix() {
        assert_eq!(talk_table().resolve_title(Some("Talk:Example")), 1);
    }

    #[test]
    fn test_resolve_without_colon() {
        assert_eq!(talk_table().resolve_title(Some("Example")), 0);
    }

    #[test]
    fn test_resolve_unknown_prefix_defaults_to_main() {
        assert_eq!(talk_table().resolve_title(Some("Bogus:Example")), 0);
    }

    #[test]
    fn test_resolve_missing_title_is_unknown() {
        let table = talk_table();
        assert_eq!(table.resolve_title(None), UNKNOWN_NAMESPACE);
        assert_eq!(table.resolve_title(Some("")), UNKNOWN_NAMESPACE);
    }

    #[test]
    fn test_main_namespace_is_unnamed() {
        let mut table = NamespaceTable::new();
        table.insert(0, "Main");
        assert_eq!(table.name(0), Some(""));
        assert_eq!(table.code(""), Some(0));
        assert_eq!(table.code("Main"), None);
    }

    #[test]
    fn test_contributor_user_ids() {
        let registered = ContributorRef::Registered { id: 42, name: Some("Alice".into()) };
        assert_eq!(registered.user_id(), 42);
        assert_eq!(registered.user_name(), Some("Alice"));
        assert_eq!(ContributorRef::Anonymous { ip: Some("10.0.0.1".into()) }.user_id(), 0);
        assert_eq!(ContributorRef::Missing.user_id(), -1);
    }

    #[test]
    fn test_record_kind() {
        let record = Record::Revision(RevisionRecord::new(7, 1, 0, "2020-01-01T00:00:00Z"));
        assert_eq!(record.kind(), RecordKind::Revision);
        assert_eq!(record.id(), 7);
        assert_eq!(RecordKind::LogItem.to_string(), "logitem");
    }
}
