//! Pipeline shape configuration

use crate::storage::SchemaMode;
use crate::types::RecordKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How pipeline stages are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One OS process per stage
    Processes,
    /// One tokio task per stage inside the orchestrator
    Tasks,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Independent pipeline lines; input files are shared out round-robin
    pub lines: usize,
    /// Page processors per line (0 drops pages)
    pub page_fan: usize,
    /// Revision processors per line (0 drops revisions)
    pub revision_fan: usize,
    /// Log item processors per line (0 drops log items)
    pub logitem_fan: usize,
    /// Items per bulk-load cycle in each sink
    pub page_cache_size: usize,
    pub revision_cache_size: usize,
    pub logitem_cache_size: usize,
    /// Language key selecting the classification patterns, e.g. `enwiki`
    pub language: String,
    #[serde(default = "default_schema_mode")]
    pub schema_mode: SchemaMode,
    #[serde(default = "default_execution")]
    pub execution: ExecutionMode,
    /// Upper bound on a whole run
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_schema_mode() -> SchemaMode {
    SchemaMode::Create
}

fn default_execution() -> ExecutionMode {
    ExecutionMode::Processes
}

fn default_run_timeout_secs() -> u64 {
    7 * 24 * 3600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lines: 1,
            page_fan: 1,
            revision_fan: 3,
            logitem_fan: 1,
            page_cache_size: 1_000_000,
            revision_cache_size: 1_000_000,
            logitem_cache_size: 1_000_000,
            language: "enwiki".to_string(),
            schema_mode: default_schema_mode(),
            execution: default_execution(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    /// Processors of `kind` per line
    pub fn fan(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Page => self.page_fan,
            RecordKind::Revision => self.revision_fan,
            RecordKind::LogItem => self.logitem_fan,
        }
    }

    pub fn cache_size(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Page => self.page_cache_size,
            RecordKind::Revision => self.revision_cache_size,
            RecordKind::LogItem => self.logitem_cache_size,
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
