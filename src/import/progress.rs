//! Progress tracking for dump decoding

use crate::types::RecordKind;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Refresh the spinner message every this many records
const MESSAGE_INTERVAL: u64 = 1000;

const PREFIX_CHARS: usize = 40;

/// Counts of records a producer has routed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeStats {
    pub pages: u64,
    pub revisions: u64,
    pub logitems: u64,
    /// Records of a kind no processor was configured for
    pub dropped: u64,
    pub elapsed_seconds: f64,
    pub records_per_second: f64,
}

impl DecodeStats {
    pub fn total(&self) -> u64 {
        self.pages + self.revisions + self.logitems + self.dropped
    }

    fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.records_per_second = self.total() as f64 / self.elapsed_seconds;
        }
    }
}

/// Progress tracker for one dump file
pub struct DecodeProgress {
    /// Spinner (None if running in quiet mode)
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
    pages: AtomicU64,
    revisions: AtomicU64,
    logitems: AtomicU64,
    dropped: AtomicU64,
}

impl DecodeProgress {
    pub fn new(source: &Path, quiet: bool) -> Self {
        let progress_bar = if !quiet {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            pb.set_prefix(shorten(&name, PREFIX_CHARS));
            pb.enable_steady_tick(Duration::from_millis(200));
            Some(pb)
        } else {
            None
        };

        Self {
            progress_bar,
            start_time: Instant::now(),
            pages: AtomicU64::new(0),
            revisions: AtomicU64::new(0),
            logitems: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Count a record handed to a processor channel
    pub fn record_routed(&self, kind: RecordKind) {
        let counter = match kind {
            RecordKind::Page => &self.pages,
            RecordKind::Revision => &self.revisions,
            RecordKind::LogItem => &self.logitems,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    /// Count a record with no processor for its kind
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    fn refresh(&self) {
        let Some(ref pb) = self.progress_bar else { return };
        let stats = self.get_stats();
        if stats.total() % MESSAGE_INTERVAL == 0 {
            pb.set_message(format!(
                "{} pages | {} revisions | {} log items | {:.0} rec/s",
                stats.pages, stats.revisions, stats.logitems, stats.records_per_second
            ));
        }
    }

    pub fn get_stats(&self) -> DecodeStats {
        let mut stats = DecodeStats {
            pages: self.pages.load(Ordering::Relaxed),
            revisions: self.revisions.load(Ordering::Relaxed),
            logitems: self.logitems.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
            records_per_second: 0.0,
        };
        stats.update_rate();
        stats
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            let stats = self.get_stats();
            pb.finish_with_message(format!(
                "Done! {} pages, {} revisions, {} log items, {:.1} rec/s",
                stats.pages, stats.revisions, stats.logitems, stats.records_per_second
            ));
        }
    }

    pub fn abandon(&self, reason: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message(reason.to_string());
        }
    }
}

/// Keep at most `max_chars` characters of a file name, marking the cut
fn shorten(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    let kept: String = name.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}~", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracking() {
        let progress = DecodeProgress::new(Path::new("/tmp/test.xml.bz2"), true);

        progress.record_routed(RecordKind::Revision);
        progress.record_routed(RecordKind::Revision);
        progress.record_routed(RecordKind::Page);
        progress.record_dropped();

        let stats = progress.get_stats();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.revisions, 2);
        assert_eq!(stats.logitems, 0);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_shorten_file_name() {
        assert_eq!(shorten("dump.xml", 40), "dump.xml");
        assert_eq!(shorten("enwiki-pages-meta-history1.xml.bz2", 10), "enwiki-pa~");
        assert_eq!(shorten("ééééé", 3), "éé~");
    }
}
