//! Streaming decoder for MediaWiki XML export dumps
//!
//! Walks the document event by event and emits a [`Record`] each time a
//! `revision`, `page` or `logitem` element closes. Only the page currently
//! open, its latest revision and one contributor are ever held, so memory
//! does not grow with the size of the dump.

use super::source::{open_dump, DecodeError};
use crate::types::{
    ContributorRef, LogItemRecord, NamespaceTable, PageRecord, Record, RevisionRecord,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, warn};

/// Elements that carry state in the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    MediaWiki,
    Namespaces,
    Page,
    Revision,
    Contributor,
    LogItem,
    Other,
}

impl Tag {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"mediawiki" => Tag::MediaWiki,
            b"namespaces" => Tag::Namespaces,
            b"page" => Tag::Page,
            b"revision" => Tag::Revision,
            b"contributor" => Tag::Contributor,
            b"logitem" => Tag::LogItem,
            _ => Tag::Other,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Tag::MediaWiki => "mediawiki",
            Tag::Namespaces => "namespaces",
            Tag::Page => "page",
            Tag::Revision => "revision",
            Tag::Contributor => "contributor",
            Tag::LogItem => "logitem",
            Tag::Other => "element",
        }
    }
}

/// Leaf elements whose text is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    NamespaceName,
    PageTitle,
    PageNs,
    PageId,
    PageRestrictions,
    RevId,
    RevTimestamp,
    RevComment,
    RevText,
    ContribName,
    ContribId,
    ContribIp,
    LogId,
    LogTimestamp,
    LogComment,
    LogType,
    LogAction,
    LogTitle,
    LogParams,
}

impl Field {
    fn lookup(parent: Tag, name: &[u8]) -> Option<Self> {
        let field = match (parent, name) {
            (Tag::Namespaces, b"namespace") => Field::NamespaceName,
            (Tag::Page, b"title") => Field::PageTitle,
            (Tag::Page, b"ns") => Field::PageNs,
            (Tag::Page, b"id") => Field::PageId,
            (Tag::Page, b"restrictions") => Field::PageRestrictions,
            (Tag::Revision, b"id") => Field::RevId,
            (Tag::Revision, b"timestamp") => Field::RevTimestamp,
            (Tag::Revision, b"comment") => Field::RevComment,
            (Tag::Revision, b"text") => Field::RevText,
            (Tag::Contributor, b"username") => Field::ContribName,
            (Tag::Contributor, b"id") => Field::ContribId,
            (Tag::Contributor, b"ip") => Field::ContribIp,
            (Tag::LogItem, b"id") => Field::LogId,
            (Tag::LogItem, b"timestamp") => Field::LogTimestamp,
            (Tag::LogItem, b"comment") => Field::LogComment,
            (Tag::LogItem, b"type") => Field::LogType,
            (Tag::LogItem, b"action") => Field::LogAction,
            (Tag::LogItem, b"logtitle") => Field::LogTitle,
            (Tag::LogItem, b"params") => Field::LogParams,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Default)]
struct PendingPage {
    id: Option<u64>,
    namespace: i32,
    title: Option<String>,
    restrictions: Option<String>,
}

#[derive(Debug, Default)]
struct PendingRevision {
    id: Option<String>,
    timestamp: Option<String>,
    comment: Option<String>,
    text: Option<String>,
    byte_len: Option<u64>,
    minor: bool,
}

#[derive(Debug, Default)]
struct PendingContributor {
    name: Option<String>,
    id: Option<String>,
    ip: Option<String>,
}

impl PendingContributor {
    fn resolve(self) -> ContributorRef {
        if self.ip.is_some() {
            return ContributorRef::Anonymous { ip: self.ip };
        }
        match self.id.as_deref().map(|id| id.trim().parse::<u64>()) {
            Some(Ok(id)) => ContributorRef::Registered { id, name: self.name },
            _ => ContributorRef::Missing,
        }
    }
}

#[derive(Debug, Default)]
struct PendingLogItem {
    id: Option<String>,
    timestamp: Option<String>,
    comment: Option<String>,
    log_type: Option<String>,
    action: Option<String>,
    title: Option<String>,
    params: Option<String>,
}

/// Counters kept while decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub pages: u64,
    pub revisions: u64,
    pub logitems: u64,
    /// Records dropped because a mandatory field was unusable
    pub skipped: u64,
    /// Largest number of partially built records held at once
    pub peak_in_flight: usize,
    /// Deepest element nesting seen
    pub peak_depth: usize,
}

/// Lazy, forward-only record stream over one dump
pub struct DumpDecoder<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    stack: Vec<Tag>,
    field: Option<Field>,
    text: String,

    namespaces: NamespaceTable,
    namespaces_seen: bool,
    namespace_key: Option<i32>,

    page: Option<PendingPage>,
    revision: Option<PendingRevision>,
    contributor: Option<PendingContributor>,
    attached_contributor: Option<ContributorRef>,
    logitem: Option<PendingLogItem>,
    parent_candidate: Option<u64>,

    ready: Option<Record>,
    stats: DecoderStats,
    root_seen: bool,
    done: bool,
}

impl<R: BufRead> DumpDecoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::with_capacity(8192),
            stack: Vec::new(),
            field: None,
            text: String::new(),
            namespaces: NamespaceTable::new(),
            namespaces_seen: false,
            namespace_key: None,
            page: None,
            revision: None,
            contributor: None,
            attached_contributor: None,
            logitem: None,
            parent_candidate: None,
            ready: None,
            stats: DecoderStats::default(),
            root_seen: false,
            done: false,
        }
    }

    /// Namespace table, once the `namespaces` element has closed
    pub fn namespaces(&self) -> Option<&NamespaceTable> {
        self.namespaces_seen.then_some(&self.namespaces)
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Partially built records currently held
    pub fn in_flight(&self) -> usize {
        [
            self.page.is_some(),
            self.revision.is_some(),
            self.contributor.is_some() || self.attached_contributor.is_some(),
            self.logitem.is_some(),
            self.ready.is_some(),
        ]
        .iter()
        .filter(|held| **held)
        .count()
    }

    /// Decode up to the end of the `siteinfo` namespace table.
    ///
    /// Returns `None` if the first page or log item starts, or the input
    /// ends, before any namespace table was seen.
    pub fn read_namespaces(&mut self) -> Result<Option<NamespaceTable>, DecodeError> {
        while !self.namespaces_seen {
            if matches!(self.stack.last(), Some(Tag::Page) | Some(Tag::LogItem)) {
                return Ok(None);
            }
            if !self.step()? {
                return Ok(None);
            }
        }
        Ok(Some(self.namespaces.clone()))
    }

    /// Process one XML event. Returns false at end of input.
    fn step(&mut self) -> Result<bool, DecodeError> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let result = self.dispatch(&mut buf);
        self.buf = buf;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight());
        result
    }

    fn dispatch(&mut self, buf: &mut Vec<u8>) -> Result<bool, DecodeError> {
        let event = self
            .reader
            .read_event_into(buf)
            .map_err(|e| self.xml_error(e.to_string()))?;

        match event {
            Event::Start(ref e) => self.on_start(e)?,
            Event::Empty(ref e) => {
                self.on_start(e)?;
                self.on_end()?;
            }
            Event::End(_) => self.on_end()?,
            Event::Text(ref e) => {
                if self.field.is_some() {
                    let text = e.unescape().map_err(|e| self.xml_error(e.to_string()))?;
                    self.text.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                if self.field.is_some() {
                    self.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::Eof => {
                if let Some(open) = self.stack.last() {
                    return Err(DecodeError::Truncated(open.name().to_string()));
                }
                if !self.root_seen {
                    return Err(DecodeError::InvalidFormat("document is empty".to_string()));
                }
                return Ok(false);
            }
            _ => {}
        }
        Ok(true)
    }

    fn xml_error(&self, message: String) -> DecodeError {
        DecodeError::XmlParse {
            position: self.reader.buffer_position() as u64,
            message,
        }
    }

    fn on_start(&mut self, e: &BytesStart<'_>) -> Result<(), DecodeError> {
        let local = e.local_name();
        let name = local.as_ref();
        let tag = Tag::from_name(name);

        let parent = match self.stack.last() {
            Some(parent) => *parent,
            None => {
                if tag != Tag::MediaWiki {
                    return Err(DecodeError::InvalidFormat(format!(
                        "root element is <{}>, expected <mediawiki>",
                        String::from_utf8_lossy(name)
                    )));
                }
                self.root_seen = true;
                self.stack.push(tag);
                return Ok(());
            }
        };

        match tag {
            Tag::Page => {
                self.page = Some(PendingPage::default());
                self.parent_candidate = None;
            }
            Tag::Revision => {
                self.revision = Some(PendingRevision::default());
                self.attached_contributor = None;
            }
            Tag::LogItem => {
                self.logitem = Some(PendingLogItem::default());
                self.attached_contributor = None;
            }
            Tag::Contributor => {
                // A suppressed contributor has no children and stays Missing
                self.contributor = match attribute(e, b"deleted") {
                    Some(_) => None,
                    None => Some(PendingContributor::default()),
                };
            }
            _ => {}
        }

        if parent == Tag::Namespaces && name == b"namespace" {
            self.namespace_key = attribute(e, b"key").and_then(|k| k.trim().parse().ok());
        }
        if parent == Tag::Revision {
            if let Some(revision) = self.revision.as_mut() {
                match name {
                    b"minor" => revision.minor = true,
                    b"text" => {
                        revision.byte_len =
                            attribute(e, b"bytes").and_then(|b| b.trim().parse().ok())
                    }
                    _ => {}
                }
            }
        }

        self.field = Field::lookup(parent, name);
        if self.field.is_some() {
            self.text.clear();
        }
        self.stack.push(tag);
        self.stats.peak_depth = self.stats.peak_depth.max(self.stack.len());
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), DecodeError> {
        let tag = self
            .stack
            .pop()
            .ok_or_else(|| DecodeError::InvalidFormat("closing tag without opening".to_string()))?;

        if let Some(field) = self.field.take() {
            let value = std::mem::take(&mut self.text);
            self.assign(field, value);
        }

        match tag {
            Tag::Namespaces => {
                self.namespaces_seen = true;
                debug!("Namespace table with {} entries", self.namespaces.len());
            }
            Tag::Contributor => {
                let contributor = self
                    .contributor
                    .take()
                    .map(PendingContributor::resolve)
                    .unwrap_or(ContributorRef::Missing);
                self.attached_contributor = Some(contributor);
            }
            Tag::Revision => self.finish_revision(),
            Tag::Page => self.finish_page(),
            Tag::LogItem => self.finish_logitem(),
            _ => {}
        }
        Ok(())
    }

    fn assign(&mut self, field: Field, value: String) {
        match field {
            Field::NamespaceName => {
                if let Some(key) = self.namespace_key.take() {
                    self.namespaces.insert(key, value);
                }
            }
            Field::PageTitle | Field::PageNs | Field::PageId | Field::PageRestrictions => {
                let Some(page) = self.page.as_mut() else { return };
                match field {
                    Field::PageTitle => page.title = Some(value),
                    Field::PageNs => page.namespace = value.trim().parse().unwrap_or(0),
                    Field::PageId => {
                        page.id = value.trim().parse().ok();
                        if page.id.is_none() {
                            warn!("Unparsable page id {:?}", value);
                        }
                    }
                    _ => page.restrictions = Some(value).filter(|r| !r.is_empty()),
                }
            }
            Field::RevId | Field::RevTimestamp | Field::RevComment | Field::RevText => {
                let Some(revision) = self.revision.as_mut() else { return };
                match field {
                    Field::RevId => revision.id = Some(value),
                    Field::RevTimestamp => revision.timestamp = Some(value),
                    Field::RevComment => revision.comment = Some(value),
                    _ => revision.text = Some(value).filter(|t| !t.is_empty()),
                }
            }
            Field::ContribName | Field::ContribId | Field::ContribIp => {
                let Some(contributor) = self.contributor.as_mut() else { return };
                match field {
                    Field::ContribName => contributor.name = Some(value),
                    Field::ContribId => contributor.id = Some(value),
                    _ => contributor.ip = Some(value),
                }
            }
            _ => {
                let Some(item) = self.logitem.as_mut() else { return };
                match field {
                    Field::LogId => item.id = Some(value),
                    Field::LogTimestamp => item.timestamp = Some(value),
                    Field::LogComment => item.comment = Some(value),
                    Field::LogType => item.log_type = Some(value),
                    Field::LogAction => item.action = Some(value),
                    Field::LogTitle => item.title = Some(value),
                    _ => item.params = Some(value),
                }
            }
        }
    }

    fn finish_revision(&mut self) {
        let Some(revision) = self.revision.take() else { return };
        let contributor = self.attached_contributor.take().unwrap_or_default();

        let Some((page_id, namespace)) = self.page.as_ref().and_then(|p| Some((p.id?, p.namespace)))
        else {
            warn!("Skipping revision outside a page with a usable id");
            self.stats.skipped += 1;
            return;
        };
        let Some(id) = revision.id.as_deref().and_then(|id| id.trim().parse::<u64>().ok()) else {
            warn!(page_id, "Skipping revision with unparsable id {:?}", revision.id);
            self.stats.skipped += 1;
            return;
        };

        let record = RevisionRecord {
            id,
            page_id,
            namespace,
            contributor,
            timestamp: revision.timestamp.unwrap_or_default(),
            byte_len: revision.byte_len,
            parent_id: self.parent_candidate,
            minor: revision.minor,
            comment: revision.comment,
            text: revision.text,
            redirect: false,
            flags: None,
            text_hash: None,
        };
        self.parent_candidate = Some(id);
        self.stats.revisions += 1;
        self.ready = Some(Record::Revision(record));
    }

    fn finish_page(&mut self) {
        self.parent_candidate = None;
        let Some(page) = self.page.take() else { return };
        let Some(id) = page.id else {
            warn!("Skipping page {:?} without a usable id", page.title);
            self.stats.skipped += 1;
            return;
        };
        self.stats.pages += 1;
        self.ready = Some(Record::Page(PageRecord {
            id,
            namespace: page.namespace,
            title: page.title.unwrap_or_default(),
            restrictions: page.restrictions,
        }));
    }

    fn finish_logitem(&mut self) {
        let Some(item) = self.logitem.take() else { return };
        let contributor = self.attached_contributor.take().unwrap_or_default();
        let Some(id) = item.id.as_deref().and_then(|id| id.trim().parse::<u64>().ok()) else {
            warn!("Skipping log item with unparsable id {:?}", item.id);
            self.stats.skipped += 1;
            return;
        };

        self.stats.logitems += 1;
        self.ready = Some(Record::LogItem(LogItemRecord {
            id,
            log_type: item.log_type,
            action: item.action,
            timestamp: item.timestamp.unwrap_or_default(),
            contributor,
            namespace: self.namespaces.resolve_title(item.title.as_deref()),
            title: item.title.unwrap_or_default(),
            comment: item.comment,
            params: item.params,
            details: None,
        }));
    }
}

impl<R: BufRead> Iterator for DumpDecoder<R> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.step() {
                Ok(true) => {
                    if let Some(record) = self.ready.take() {
                        return Some(Ok(record));
                    }
                }
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Read only the namespace table of a dump file
pub fn read_namespaces(path: &Path) -> Result<NamespaceTable, DecodeError> {
    let mut decoder = DumpDecoder::new(open_dump(path)?);
    decoder.read_namespaces()?.ok_or(DecodeError::MissingNamespaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordKind, UNKNOWN_NAMESPACE};
    use std::io::{BufReader, Read};

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.10/">
  <siteinfo>
    <sitename>Wikipedia</sitename>
    <namespaces>
      <namespace key="-1" case="first-letter">Special</namespace>
      <namespace key="0" case="first-letter" />
      <namespace key="1" case="first-letter">Talk</namespace>
      <namespace key="2" case="first-letter">User</namespace>
    </namespaces>
  </siteinfo>
  <page>
    <title>Alpha</title>
    <ns>0</ns>
    <id>10</id>
    <revision>
      <id>100</id>
      <timestamp>2010-01-01T00:00:00Z</timestamp>
      <contributor>
        <username>Alice</username>
        <id>7</id>
      </contributor>
      <comment>first</comment>
      <text xml:space="preserve" bytes="5">Hello</text>
    </revision>
    <revision>
      <id>105</id>
      <parentid>100</parentid>
      <timestamp>2010-01-02T00:00:00Z</timestamp>
      <contributor>
        <ip>10.0.0.1</ip>
      </contributor>
      <minor />
      <text xml:space="preserve" bytes="0" />
    </revision>
    <revision>
      <id>110</id>
      <timestamp>2010-01-03T00:00:00Z</timestamp>
      <contributor deleted="deleted" />
      <text xml:space="preserve">Hello &amp; bye</text>
    </revision>
  </page>
  <page>
    <title>Talk:Beta</title>
    <ns>1</ns>
    <id>11</id>
    <restrictions>edit=sysop</restrictions>
  </page>
</mediawiki>
"#;

    fn decode(xml: &str) -> Vec<Record> {
        DumpDecoder::new(xml.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_records_follow_document_order() {
        let records = decode(SAMPLE_XML);
        let kinds: Vec<_> = records.iter().map(|r| (r.kind(), r.id())).collect();
        assert_eq!(
            kinds,
            vec![
                (RecordKind::Revision, 100),
                (RecordKind::Revision, 105),
                (RecordKind::Revision, 110),
                (RecordKind::Page, 10),
                (RecordKind::Page, 11),
            ]
        );
    }

    #[test]
    fn test_parent_ids_chain_within_page() {
        let parents: Vec<_> = decode(SAMPLE_XML)
            .into_iter()
            .filter_map(|r| match r {
                Record::Revision(rev) => Some(rev.parent_id),
                _ => None,
            })
            .collect();
        assert_eq!(parents, vec![None, Some(100), Some(105)]);
    }

    #[test]
    fn test_revision_fields() {
        let records = decode(SAMPLE_XML);
        let Record::Revision(first) = &records[0] else { panic!("expected revision") };
        assert_eq!(first.page_id, 10);
        assert_eq!(first.namespace, 0);
        assert_eq!(first.text.as_deref(), Some("Hello"));
        assert_eq!(first.byte_len, Some(5));
        assert_eq!(first.comment.as_deref(), Some("first"));
        assert!(!first.minor);
        assert_eq!(
            first.contributor,
            ContributorRef::Registered { id: 7, name: Some("Alice".to_string()) }
        );

        let Record::Revision(second) = &records[1] else { panic!("expected revision") };
        assert!(second.minor);
        assert_eq!(second.text, None);
        assert_eq!(second.contributor, ContributorRef::Anonymous { ip: Some("10.0.0.1".into()) });

        let Record::Revision(third) = &records[2] else { panic!("expected revision") };
        assert_eq!(third.contributor, ContributorRef::Missing);
        assert_eq!(third.text.as_deref(), Some("Hello & bye"));
    }

    #[test]
    fn test_page_without_revisions_is_emitted() {
        let records = decode(SAMPLE_XML);
        let Record::Page(page) = &records[4] else { panic!("expected page") };
        assert_eq!(page.id, 11);
        assert_eq!(page.namespace, 1);
        assert_eq!(page.title, "Talk:Beta");
        assert_eq!(page.restrictions.as_deref(), Some("edit=sysop"));
    }

    #[test]
    fn test_namespace_table() {
        let mut decoder = DumpDecoder::new(SAMPLE_XML.as_bytes());
        let table = decoder.read_namespaces().unwrap().unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.name(0), Some(""));
        assert_eq!(table.code("Talk"), Some(1));
        assert_eq!(table.code("Special"), Some(-1));
    }

    #[test]
    fn test_revision_without_contributor_is_missing() {
        let xml = r#"<mediawiki><page><title>A</title><ns>0</ns><id>1</id>
            <revision><id>2</id><timestamp>t</timestamp></revision></page></mediawiki>"#;
        let records = decode(xml);
        let Record::Revision(rev) = &records[0] else { panic!("expected revision") };
        assert_eq!(rev.contributor, ContributorRef::Missing);
        assert_eq!(rev.text, None);
    }

    #[test]
    fn test_logitem_namespace_resolution() {
        let xml = r#"<mediawiki>
          <siteinfo><namespaces>
            <namespace key="0" />
            <namespace key="1">Talk</namespace>
          </namespaces></siteinfo>
          <logitem><id>1</id><timestamp>t</timestamp><type>delete</type><action>delete</action>
            <logtitle>Talk:Example</logtitle></logitem>
          <logitem><id>2</id><timestamp>t</timestamp><logtitle>Example</logtitle></logitem>
          <logitem><id>3</id><timestamp>t</timestamp><logtitle>Bogus:Example</logtitle></logitem>
          <logitem><id>4</id><timestamp>t</timestamp>
            <contributor><username>Bob</username><id>9</id></contributor></logitem>
        </mediawiki>"#;
        let namespaces: Vec<_> = decode(xml)
            .into_iter()
            .map(|r| match r {
                Record::LogItem(item) => item.namespace,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(namespaces, vec![1, 0, 0, UNKNOWN_NAMESPACE]);
    }

    #[test]
    fn test_logitem_fields() {
        let xml = r#"<mediawiki><logitem>
            <id>55</id><timestamp>2012-05-05T10:00:00Z</timestamp>
            <contributor><username>Bob</username><id>9</id></contributor>
            <comment>spam</comment><type>block</type><action>block</action>
            <logtitle>User:Vandal</logtitle><params xml:space="preserve">1 week</params>
          </logitem></mediawiki>"#;
        let records = decode(xml);
        let Record::LogItem(item) = &records[0] else { panic!("expected log item") };
        assert_eq!(item.id, 55);
        assert_eq!(item.log_type.as_deref(), Some("block"));
        assert_eq!(item.action.as_deref(), Some("block"));
        assert_eq!(item.title, "User:Vandal");
        assert_eq!(item.params.as_deref(), Some("1 week"));
        assert_eq!(item.contributor.user_id(), 9);
    }

    #[test]
    fn test_unparsable_revision_id_is_skipped() {
        let xml = r#"<mediawiki><page><title>A</title><ns>0</ns><id>1</id>
            <revision><id>x</id></revision>
            <revision><id>3</id></revision></page></mediawiki>"#;
        let mut decoder = DumpDecoder::new(xml.as_bytes());
        let records: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        let Record::Revision(rev) = &records[0] else { panic!("expected revision") };
        assert_eq!(rev.parent_id, None);
        assert_eq!(decoder.stats().skipped, 1);
    }

    #[test]
    fn test_truncated_document_is_fatal() {
        let xml = "<mediawiki><page><title>A</title><id>1</id>";
        let results: Vec<_> = DumpDecoder::new(xml.as_bytes()).collect();
        assert!(matches!(results.last(), Some(Err(DecodeError::Truncated(_)))));
    }

    #[test]
    fn test_mismatched_tags_are_fatal() {
        let xml = "<mediawiki><page><title>A</page></mediawiki>";
        let results: Vec<_> = DumpDecoder::new(xml.as_bytes()).collect();
        assert!(matches!(results.last(), Some(Err(DecodeError::XmlParse { .. }))));
    }

    #[test]
    fn test_wrong_root_is_fatal() {
        let results: Vec<_> = DumpDecoder::new("<html><body/></html>".as_bytes()).collect();
        assert!(matches!(results[0], Err(DecodeError::InvalidFormat(_))));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_missing_namespaces() {
        let xml = "<mediawiki><page><title>A</title><id>1</id></page></mediawiki>";
        let mut decoder = DumpDecoder::new(xml.as_bytes());
        assert!(decoder.read_namespaces().unwrap().is_none());
    }

    /// Produces a dump with `pages` pages on the fly, never holding it whole
    struct GeneratedDump {
        pages: u64,
        next_page: u64,
        chunk: Vec<u8>,
        offset: usize,
        finished: bool,
    }

    impl GeneratedDump {
        fn new(pages: u64) -> Self {
            Self {
                pages,
                next_page: 0,
                chunk: b"<mediawiki><siteinfo><namespaces><namespace key=\"0\"/></namespaces></siteinfo>"
                    .to_vec(),
                offset: 0,
                finished: false,
            }
        }

        fn refill(&mut self) {
            self.offset = 0;
            if self.next_page < self.pages {
                let id = self.next_page;
                let filler = "lorem ipsum ".repeat(40);
                self.chunk = format!(
                    "<page><title>P{id}</title><ns>0</ns><id>{id}</id>\
                     <revision><id>{a}</id><text>{filler}</text></revision>\
                     <revision><id>{b}</id><text>{filler}</text></revision></page>",
                    a = id * 2 + 1,
                    b = id * 2 + 2,
                )
                .into_bytes();
                self.next_page += 1;
            } else if !self.finished {
                self.chunk = b"</mediawiki>".to_vec();
                self.finished = true;
            } else {
                self.chunk.clear();
            }
        }
    }

    impl Read for GeneratedDump {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            if self.offset == self.chunk.len() {
                self.refill();
            }
            let n = out.len().min(self.chunk.len() - self.offset);
            out[..n].copy_from_slice(&self.chunk[self.offset..self.offset + n]);
            self.offset += n;
            Ok(n)
        }
    }

    #[test]
    fn test_decoder_state_is_bounded() {
        let pages = 20_000;
        let mut decoder = DumpDecoder::new(BufReader::new(GeneratedDump::new(pages)));
        let mut count = 0u64;
        let mut last_parent = None;
        for record in decoder.by_ref() {
            if let Record::Revision(rev) = record.unwrap() {
                if rev.id % 2 == 0 {
                    assert_eq!(rev.parent_id, Some(rev.id - 1));
                } else {
                    assert_eq!(rev.parent_id, None);
                }
                last_parent = rev.parent_id;
            }
            count += 1;
        }

        assert_eq!(count, pages * 3);
        assert_eq!(last_parent, Some(pages * 2 - 1));
        let stats = decoder.stats();
        assert_eq!(stats.pages, pages);
        assert_eq!(stats.revisions, pages * 2);
        assert!(stats.peak_in_flight <= 4, "peak in flight {}", stats.peak_in_flight);
        assert!(stats.peak_depth <= 4, "peak depth {}", stats.peak_depth);
    }
}
