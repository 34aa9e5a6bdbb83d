//! Record transforms run by processors
//!
//! Each record kind has one [`Transform`] that fills the processor-owned
//! fields of the record and turns it into the [`SinkItem`] its sink loads.

pub mod logitem;
pub mod page;
pub mod patterns;
pub mod revision;

pub use logitem::LogItemTransform;
pub use page::PageTransform;
pub use patterns::{is_supported_language, supported_languages, ClassificationPatterns};
pub use revision::RevisionTransform;

use crate::load::SinkItem;
use crate::types::{Record, RecordKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unsupported language key: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid classification pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("{expected} processor received a {found} record")]
    UnexpectedRecord {
        expected: RecordKind,
        found: RecordKind,
    },
}

/// Per-processor transformation state
pub trait Transform: Send {
    fn kind(&self) -> RecordKind;

    fn apply(&mut self, record: Record) -> Result<SinkItem, TransformError>;
}

/// Build the transform for `kind`. Revision transforms need a supported
/// `language` for their classification patterns.
pub fn build_transform(kind: RecordKind, language: &str) -> Result<Box<dyn Transform>, TransformError> {
    Ok(match kind {
        RecordKind::Page => Box::new(PageTransform),
        RecordKind::Revision => Box::new(RevisionTransform::new(ClassificationPatterns::for_language(language)?)),
        RecordKind::LogItem => Box::new(LogItemTransform::new()),
    })
}

pub(crate) fn unexpected(expected: RecordKind, record: &Record) -> TransformError {
    TransformError::UnexpectedRecord {
        expected,
        found: record.kind(),
    }
}

/// Normalize a dump timestamp such as `2024-01-02T03:04:05Z` to
/// `2024-01-02 03:04:05`
pub fn normalize_timestamp(timestamp: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => parsed
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => timestamp.replace('Z', "").replace('T', " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageRecord;

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(normalize_timestamp("2024-01-02T03:04:05Z"), "2024-01-02 03:04:05");
        assert_eq!(normalize_timestamp("2024-01-02T05:04:05+02:00"), "2024-01-02 03:04:05");
        assert_eq!(normalize_timestamp("2024-01-02T03:04Z"), "2024-01-02 03:04");
    }

    #[test]
    fn test_build_transform_kinds() {
        for kind in RecordKind::ALL {
            let transform = build_transform(kind, "enwiki").unwrap();
            assert_eq!(transform.kind(), kind);
        }
    }

    #[test]
    fn test_build_revision_transform_rejects_unknown_language() {
        assert!(matches!(
            build_transform(RecordKind::Revision, "xxwiki"),
            Err(TransformError::UnsupportedLanguage(_))
        ));
        // Only revisions need patterns
        assert!(build_transform(RecordKind::Page, "xxwiki").is_ok());
    }

    #[test]
    fn test_wrong_record_kind_is_rejected() {
        let mut transform = build_transform(RecordKind::LogItem, "enwiki").unwrap();
        let page = Record::Page(PageRecord {
            id: 1,
            namespace: 0,
            title: "A".to_string(),
            restrictions: None,
        });
        assert!(matches!(
            transform.apply(page),
            Err(TransformError::UnexpectedRecord {
                expected: RecordKind::LogItem,
                found: RecordKind::Page,
            })
        ));
    }
}
