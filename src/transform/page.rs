use super::{unexpected, Transform, TransformError};
use crate::load::rows::PageRow;
use crate::load::SinkItem;
use crate::types::{Record, RecordKind};

/// Pages pass through; absent restrictions become an empty string
pub struct PageTransform;

impl Transform for PageTransform {
    fn kind(&self) -> RecordKind {
        RecordKind::Page
    }

    fn apply(&mut self, record: Record) -> Result<SinkItem, TransformError> {
        let page = match record {
            Record::Page(page) => page,
            other => return Err(unexpected(RecordKind::Page, &other)),
        };
        Ok(SinkItem::Page(PageRow {
            page_id: page.id,
            namespace: page.namespace,
            title: page.title,
            restrictions: page.restrictions.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageRecord;

    #[test]
    fn test_page_row() {
        let record = Record::Page(PageRecord {
            id: 12,
            namespace: 1,
            title: "Talk:Example".to_string(),
            restrictions: None,
        });
        let SinkItem::Page(row) = PageTransform.apply(record).unwrap() else {
            panic!("expected a page row");
        };
        assert_eq!(row.page_id, 12);
        assert_eq!(row.namespace, 1);
        assert_eq!(row.title, "Talk:Example");
        assert_eq!(row.restrictions, "");
    }
}
