//! Log item rules: flagged-revision approvals, blocks, registrations and
//! rights changes each add facts on top of the plain `logging` row.

use super::{normalize_timestamp, unexpected, Transform, TransformError};
use crate::load::rows::{BlockRow, LogItemRows, LoggingRow, NewUserRow, UserLevelRow};
use crate::load::SinkItem;
use crate::types::{BlockDetails, ContributorRef, LogDetails, LogItemRecord, Record, RecordKind, RightsChange};
use crate::types::MISSING_USER_ID;
use chrono::{DateTime, NaiveDateTime};
use std::net::Ipv4Addr;
use tracing::warn;

const REVIEW_ACTIONS: &[&str] = &["approve", "approve-a", "unapprove", "approve-ia", "approve-i"];
const BLOCK_ACTIONS: &[&str] = &["block", "unblock", "reblock"];
const NEW_USER_ACTIONS: &[&str] = &["newusers", "create", "create2", "autocreate", "byemail"];

/// Duration stored for infinite blocks
pub const MAX_BLOCK_SECS: f64 = 86_399_999_999_999.99;

/// Units accepted in free-form block lengths, tried in this order at each
/// position of the unit text
const TIME_UNITS: &[(&str, f64)] = &[
    ("sec", 1.0),
    ("min", 60.0),
    ("h", 3_600.0),
    ("d", 86_400.0),
    ("week", 604_800.0),
    ("fortnight", 1_209_600.0),
    ("month", 2_592_000.0),
    ("year", 31_557_600.0),
];

#[derive(Default)]
pub struct LogItemTransform;

impl LogItemTransform {
    pub fn new() -> Self {
        Self
    }

    /// Derive the sub-facts of a log item from its type, action and params
    pub fn details(&self, item: &LogItemRecord, timestamp: &str) -> LogDetails {
        let log_type = item.log_type.as_deref().unwrap_or("");
        let action = item.action.as_deref().unwrap_or("");
        let params = item.params.as_deref().filter(|p| !p.is_empty());

        let mut details = LogDetails::default();
        if log_type == "review" && REVIEW_ACTIONS.contains(&action) {
            details.flagged = params.and_then(flagged_levels);
        }
        if log_type == "block" && BLOCK_ACTIONS.contains(&action) {
            details.block = Some(block_details(item, params, timestamp));
        }
        if log_type == "newusers" && NEW_USER_ACTIONS.contains(&action) {
            details.new_user = true;
        }
        if log_type == "rights" && action == "rights" {
            details.rights = Some(rights_change(item, params));
        }
        details
    }
}

impl Transform for LogItemTransform {
    fn kind(&self) -> RecordKind {
        RecordKind::LogItem
    }

    fn apply(&mut self, record: Record) -> Result<SinkItem, TransformError> {
        let mut item = match record {
            Record::LogItem(item) => item,
            other => return Err(unexpected(RecordKind::LogItem, &other)),
        };
        let timestamp = normalize_timestamp(&item.timestamp);
        let details = self.details(&item, &timestamp);
        item.details = Some(details.clone());

        let user_id = log_user_id(&item.contributor);
        let username = item.contributor.user_name().unwrap_or("").to_string();
        let action = item.action.clone().unwrap_or_default();
        let (new_flag, old_flag) = details.flagged.unwrap_or((0, 0));

        let block = details.block.map(|block| BlockRow {
            log_id: item.id,
            action: action.clone(),
            user_id,
            timestamp: timestamp.clone(),
            target: block.target,
            target_ip: block.target_ip,
            duration_secs: block.duration_secs,
        });
        let new_user = details.new_user.then(|| NewUserRow {
            log_id: item.id,
            user_id,
            user_name: username.clone(),
            timestamp: timestamp.clone(),
            action: action.clone(),
        });
        let user_level = details.rights.map(|rights| UserLevelRow {
            log_id: item.id,
            granter_id: user_id,
            username: rights.username,
            timestamp: timestamp.clone(),
            old_groups: rights.old_groups,
            new_groups: rights.new_groups,
        });

        Ok(SinkItem::LogItem(LogItemRows {
            logging: LoggingRow {
                log_id: item.id,
                log_type: item.log_type.unwrap_or_default(),
                action,
                timestamp,
                user_id,
                username,
                namespace: item.namespace,
                title: item.title,
                comment: item.comment.unwrap_or_default(),
                params: item.params.unwrap_or_default(),
                new_flag,
                old_flag,
            },
            block,
            new_user,
            user_level,
        }))
    }
}

/// Log rows only know registered users; anyone else is -1
fn log_user_id(contributor: &ContributorRef) -> i64 {
    match contributor {
        ContributorRef::Registered { .. } => contributor.user_id(),
        _ => MISSING_USER_ID,
    }
}

/// New and old stable revision ids from review params. A third line, the
/// stable timestamp, is ignored.
fn flagged_levels(params: &str) -> Option<(u64, u64)> {
    let lines: Vec<&str> = params.split('\n').collect();
    let level = |line: &str| line.trim().parse::<u64>().unwrap_or(0);
    match lines.as_slice() {
        [new] => Some((level(*new), 0)),
        [new, old] | [new, old, _] => Some((level(*new), level(*old))),
        _ => None,
    }
}

fn block_details(item: &LogItemRecord, params: Option<&str>, timestamp: &str) -> BlockDetails {
    let mut details = BlockDetails {
        target: String::new(),
        target_ip: 0,
        duration_secs: 0.0,
    };

    // Only a plain `Prefix:target` title names a block target
    let mut parts = item.title.split(':');
    if let (Some(_), Some(target), None) = (parts.next(), parts.next(), parts.next()) {
        if looks_like_ipv4(target) {
            match parse_ipv4(target) {
                Some(ip) => details.target_ip = u32::from(ip),
                None => warn!("Log item {}: invalid blocked address {:?}", item.id, target),
            }
        } else {
            details.target = target.to_string();
        }
    }

    if let Some(params) = params {
        details.duration_secs = block_duration(params, timestamp);
    }
    details
}

fn looks_like_ipv4(target: &str) -> bool {
    let octets: Vec<&str> = target.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| (1..=3).contains(&o.len()) && o.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a dotted quad, tolerating zero-padded octets such as `010`
fn parse_ipv4(target: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(target.split('.')) {
        *slot = part.parse().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

/// Block length in seconds from the first params line: either an expiry
/// date or a count with a unit (`3 days`, `1 week`, `infinite`)
pub fn block_duration(params: &str, timestamp: &str) -> f64 {
    let first = params.split('\n').next().unwrap_or("").trim();
    if first.is_empty() {
        return 0.0;
    }

    let expiry = parse_expiry(first).or_else(|| parse_expiry(&first.replace('Z', "").replace('T', " ")));
    if let (Some(expiry), Some(start)) = (expiry, parse_naive(timestamp)) {
        return (expiry - start).num_milliseconds() as f64 / 1000.0;
    }

    let digits_end = first.find(|c: char| !c.is_ascii_digit()).unwrap_or(first.len());
    let (count, rest) = first.split_at(digits_end);
    let units = rest
        .split(|c: char| c.is_ascii_digit())
        .next()
        .unwrap_or("")
        .to_lowercase();

    if units.contains("infinite") || units.contains("indefinite") {
        return MAX_BLOCK_SECS;
    }
    if count.is_empty() {
        return 0.0;
    }
    let Some(unit_secs) = unit_seconds(&units) else {
        return 0.0;
    };
    match count.parse::<u64>() {
        Ok(count) => (count as f64 * unit_secs).min(MAX_BLOCK_SECS),
        Err(_) => MAX_BLOCK_SECS,
    }
}

fn unit_seconds(units: &str) -> Option<f64> {
    units
        .char_indices()
        .find_map(|(i, _)| {
            TIME_UNITS
                .iter()
                .find(|(name, _)| units[i..].starts_with(name))
        })
        .map(|(_, secs)| *secs)
}

fn parse_expiry(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.naive_utc());
    }
    parse_naive(text)
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y%m%d%H%M%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text.trim(), format).ok())
}

/// Old and new groups of a rights change
fn rights_change(item: &LogItemRecord, params: Option<&str>) -> RightsChange {
    let username = item.title.split(':').nth(1).unwrap_or("").to_string();

    let (old_groups, new_groups) = match params {
        Some(params) => {
            let lines: Vec<&str> = params.split('\n').collect();
            if lines.len() > 1 {
                (lines[0].to_string(), lines[1].to_string())
            } else if let Some((_, groups)) = params.split_once("\"4::oldgroups\"") {
                let (old, new) = groups.split_once("\"5::newgroups\"").unwrap_or((groups, ""));
                (quoted_values(old).join(","), quoted_values(new).join(","))
            } else {
                (String::new(), params.to_string())
            }
        }
        None => match item.comment.as_deref() {
            Some(comment) if !comment.is_empty() => (String::new(), comment.to_string()),
            _ => (String::new(), String::new()),
        },
    };

    RightsChange {
        username,
        old_groups,
        new_groups,
    }
}

/// Non-empty strings enclosed in double quotes
fn quoted_values(text: &str) -> Vec<&str> {
    text.split('"')
        .skip(1)
        .step_by(2)
        .filter(|value| !value.is_empty())
        .collect()
}
