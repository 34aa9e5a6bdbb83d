//! Stage descriptions
//!
//! A [`StageSpec`] holds everything one stage needs, so it can run as a
//! task in the orchestrator or be handed to a child process as JSON.

use super::{processor, producer, sink, PipelineError};
use crate::config::{NetworkConfig, StorageConfig};
use crate::load::LoadStats;
use crate::types::RecordKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Processors per record kind in one line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fans {
    pub page: usize,
    pub revision: usize,
    pub logitem: usize,
}

impl Fans {
    pub fn get(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Page => self.page,
            RecordKind::Revision => self.revision,
            RecordKind::LogItem => self.logitem,
        }
    }

    pub fn total(&self) -> usize {
        self.page + self.revision + self.logitem
    }

    /// Kinds with at least one processor
    pub fn active(&self) -> impl Iterator<Item = RecordKind> + '_ {
        RecordKind::ALL.into_iter().filter(|kind| self.get(*kind) > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSpec {
    pub line: usize,
    pub dump: PathBuf,
    pub fans: Fans,
    pub network: NetworkConfig,
    /// Wait for acknowledgements of the final terminators
    pub ack_timeout_secs: u64,
    pub progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub line: usize,
    pub kind: RecordKind,
    /// Position within the fan of this kind
    pub index: usize,
    pub language: String,
    pub network: NetworkConfig,
    pub ack_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    pub line: usize,
    pub kind: RecordKind,
    /// Processors feeding this sink
    pub fan: usize,
    pub cache_size: usize,
    pub storage: StorageConfig,
    pub failure_log: PathBuf,
    pub network: NetworkConfig,
}

/// One pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum StageSpec {
    Producer(ProducerSpec),
    Processor(ProcessorSpec),
    Sink(SinkSpec),
}

impl StageSpec {
    /// Stage name used in logs, reports and staged file names
    pub fn name(&self) -> String {
        match self {
            StageSpec::Producer(spec) => format!("line{}-producer", spec.line),
            StageSpec::Processor(spec) => {
                format!("line{}-{}-processor{}", spec.line, spec.kind, spec.index)
            }
            StageSpec::Sink(spec) => format!("line{}-{}-sink", spec.line, spec.kind),
        }
    }
}

impl ProducerSpec {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl ProcessorSpec {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

/// Counters a stage reports when it finishes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    /// Records decoded, or items pulled from the intake
    pub received: u64,
    /// Items handed to the next stage
    pub emitted: u64,
    /// Records dropped or rejected
    pub skipped: u64,
    /// Bulk-load counters of a sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadStats>,
}

impl StageReport {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }
}

/// Run one stage to completion
pub async fn run_stage(spec: StageSpec) -> Result<StageReport, PipelineError> {
    match spec {
        StageSpec::Producer(spec) => producer::run(spec).await,
        StageSpec::Processor(spec) => processor::run(spec).await,
        StageSpec::Sink(spec) => sink::run(spec).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_spec() -> StageSpec {
        StageSpec::Processor(ProcessorSpec {
            line: 1,
            kind: RecordKind::Revision,
            index: 2,
            language: "enwiki".to_string(),
            network: NetworkConfig::default(),
            ack_timeout_secs: 60,
        })
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(processor_spec().name(), "line1-revision-processor2");

        let sink = StageSpec::Sink(SinkSpec {
            line: 0,
            kind: RecordKind::LogItem,
            fan: 1,
            cache_size: 10,
            storage: StorageConfig::default(),
            failure_log: PathBuf::from("logs/line-0.errors.jsonl"),
            network: NetworkConfig::default(),
        });
        assert_eq!(sink.name(), "line0-logitem-sink");
    }

    #[test]
    fn test_spec_json_is_tagged() {
        let json = serde_json::to_string(&processor_spec()).unwrap();
        assert!(json.contains("\"role\":\"processor\""));

        let parsed: StageSpec = serde_json::from_str(&json).unwrap();
        match parsed {
            StageSpec::Processor(spec) => {
                assert_eq!(spec.kind, RecordKind::Revision);
                assert_eq!(spec.index, 2);
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_active_kinds() {
        let fans = Fans {
            page: 1,
            revision: 0,
            logitem: 2,
        };
        let active: Vec<_> = fans.active().collect();
        assert_eq!(active, vec![RecordKind::Page, RecordKind::LogItem]);
        assert_eq!(fans.total(), 3);
    }
}
