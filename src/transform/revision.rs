use super::{normalize_timestamp, unexpected, ClassificationPatterns, Transform, TransformError};
use crate::load::rows::{RevisionHashRow, RevisionRow, RevisionRows, UserRow};
use crate::load::SinkItem;
use crate::types::{ClassificationFlags, ContributorRef, Record, RecordKind, RevisionRecord};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

const REDIRECT_MARK: &str = "#REDIRECT";

pub struct RevisionTransform {
    patterns: ClassificationPatterns,
    /// Registered users this processor already emitted a row for
    seen_users: HashSet<u64>,
}

impl RevisionTransform {
    pub fn new(patterns: ClassificationPatterns) -> Self {
        Self {
            patterns,
            seen_users: HashSet::new(),
        }
    }

    /// Fill the processor-owned fields of a revision
    pub fn annotate(&self, revision: &mut RevisionRecord) {
        let text = revision.text.as_deref();
        revision.text_hash = Some(text_hash(text.unwrap_or("")));
        revision.redirect = text.is_some_and(is_redirect);
        revision.flags = match text {
            Some(text) if revision.namespace == 0 => Some(ClassificationFlags {
                featured_article: self.patterns.is_featured_article(text),
                featured_list: self.patterns.is_featured_list(text),
                good_article: self.patterns.is_good_article(text),
            }),
            _ => None,
        };
    }

    fn first_sight(&mut self, contributor: &ContributorRef) -> Option<UserRow> {
        let ContributorRef::Registered { id, name } = contributor else {
            return None;
        };
        if !self.seen_users.insert(*id) {
            return None;
        }
        Some(UserRow {
            user_id: contributor.user_id(),
            user_name: name.clone().unwrap_or_default(),
        })
    }
}

impl Transform for RevisionTransform {
    fn kind(&self) -> RecordKind {
        RecordKind::Revision
    }

    fn apply(&mut self, record: Record) -> Result<SinkItem, TransformError> {
        let mut revision = match record {
            Record::Revision(revision) => revision,
            other => return Err(unexpected(RecordKind::Revision, &other)),
        };
        self.annotate(&mut revision);

        let user_id = revision.contributor.user_id();
        let user = self.first_sight(&revision.contributor);
        let flags = revision.flags.unwrap_or_default();
        let len = match &revision.text {
            Some(text) => text.len() as u64,
            None => revision.byte_len.unwrap_or(0),
        };

        Ok(SinkItem::Revision(RevisionRows {
            hash: RevisionHashRow {
                rev_id: revision.id,
                page_id: revision.page_id,
                user_id,
                hash: revision.text_hash.take().unwrap_or_default(),
            },
            revision: RevisionRow {
                rev_id: revision.id,
                page_id: revision.page_id,
                user_id,
                timestamp: normalize_timestamp(&revision.timestamp),
                len,
                parent_id: revision.parent_id,
                redirect: revision.redirect,
                minor: revision.minor,
                featured_article: flags.featured_article,
                featured_list: flags.featured_list,
                good_article: flags.good_article,
                comment: revision.comment.unwrap_or_default(),
            },
            user,
        }))
    }
}

fn is_redirect(text: &str) -> bool {
    text.chars()
        .take(REDIRECT_MARK.len())
        .flat_map(char::to_uppercase)
        .eq(REDIRECT_MARK.chars())
}

fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
