//! Run orchestration
//!
//! The orchestrator prepares the schema, splits the dump files across
//! lines, launches and joins the stages of every file, and finally builds
//! the indexes.

use super::launcher::{Launcher, StageHandle};
use super::stage::{Fans, ProcessorSpec, ProducerSpec, SinkSpec, StageReport, StageSpec};
use super::PipelineError;
use crate::config::Config;
use crate::import::{read_namespaces, DecodeError, DumpFormat};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Where a run is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Init,
    SchemaPrepared,
    LinesRunning,
    LinesJoined,
    IndexesBuilt,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::SchemaPrepared => "schema-prepared",
            RunState::LinesRunning => "lines-running",
            RunState::LinesJoined => "lines-joined",
            RunState::IndexesBuilt => "indexes-built",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineReport {
    pub line: usize,
    pub files: Vec<PathBuf>,
    pub stages: Vec<StageReport>,
    /// Failed bulk loads of this line, if any were recorded
    pub failure_log: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub lines: Vec<LineReport>,
}

impl RunReport {
    /// Failure logs that actually received entries
    pub fn failure_logs(&self) -> Vec<&Path> {
        self.lines
            .iter()
            .map(|line| line.failure_log.as_path())
            .filter(|path| path.exists())
            .collect()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.lines
            .iter()
            .flat_map(|line| line.stages.iter())
            .find(|stage| stage.stage == name)
    }
}

pub struct Orchestrator {
    config: Config,
    launcher: Arc<dyn Launcher>,
    state: RunState,
}

impl Orchestrator {
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        info!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Load every dump in `paths`
    pub async fn run(&mut self, paths: &[PathBuf]) -> Result<RunReport, PipelineError> {
        let first = paths
            .first()
            .ok_or_else(|| PipelineError::InvalidInput("no dump files given".to_string()))?;
        for path in paths {
            if DumpFormat::detect(path).is_none() {
                return Err(PipelineError::InvalidInput(format!(
                    "unsupported dump extension: {}",
                    path.display()
                )));
            }
        }

        let store = storage::connect(&self.config.storage).await?;
        store.prepare_schema(self.config.pipeline.schema_mode).await?;
        let namespaces = load_namespaces(first).await?;
        store.insert_namespaces(&namespaces).await?;
        info!("Loaded {} namespaces from {}", namespaces.iter().count(), first.display());
        self.advance(RunState::SchemaPrepared);

        let assignments = assign_lines(paths, self.config.pipeline.lines);
        self.advance(RunState::LinesRunning);

        let run_timeout = self.config.pipeline.run_timeout();
        let lines = {
            let this = &*self;
            let running = futures::future::try_join_all(
                assignments
                    .into_iter()
                    .enumerate()
                    .map(move |(line, files)| this.run_line(line, files)),
            );
            tokio::time::timeout(run_timeout, running)
                .await
                .map_err(|_| PipelineError::Timeout(run_timeout))??
        };
        self.advance(RunState::LinesJoined);

        store.build_indexes().await?;
        self.advance(RunState::IndexesBuilt);

        self.advance(RunState::Done);
        Ok(RunReport { lines })
    }

    async fn run_line(&self, line: usize, files: Vec<PathBuf>) -> Result<LineReport, PipelineError> {
        let mut stages = Vec::new();
        for file in &files {
            info!("Line {}: loading {}", line, file.display());
            stages.extend(self.run_file(line, file).await?);
        }
        Ok(LineReport {
            line,
            files,
            stages,
            failure_log: self.config.storage.failure_log_path(line),
        })
    }

    /// Launch sinks, then processors, then the producer; join in reverse
    async fn run_file(&self, line: usize, dump: &Path) -> Result<Vec<StageReport>, PipelineError> {
        let specs = self.stage_specs(line, dump);
        let mut sinks = Vec::new();
        for spec in specs.sinks {
            sinks.push(self.launcher.launch(spec).await?);
        }
        let mut processors = Vec::new();
        for spec in specs.processors {
            processors.push(self.launcher.launch(spec).await?);
        }
        let producer = self.launcher.launch(specs.producer).await?;

        let mut reports = vec![join(producer).await?];
        for handle in processors {
            reports.push(join(handle).await?);
        }
        for handle in sinks {
            reports.push(join(handle).await?);
        }
        Ok(reports)
    }

    fn stage_specs(&self, line: usize, dump: &Path) -> LineStages {
        let pipeline = &self.config.pipeline;
        let network = &self.config.network;
        let ack_timeout_secs = pipeline.run_timeout_secs;
        let fans = Fans {
            page: pipeline.page_fan,
            revision: pipeline.revision_fan,
            logitem: pipeline.logitem_fan,
        };

        let sinks = fans
            .active()
            .map(|kind| {
                StageSpec::Sink(SinkSpec {
                    line,
                    kind,
                    fan: fans.get(kind),
                    cache_size: pipeline.cache_size(kind),
                    storage: self.config.storage.clone(),
                    failure_log: self.config.storage.failure_log_path(line),
                    network: network.clone(),
                })
            })
            .collect();

        let processors = fans
            .active()
            .flat_map(|kind| (0..fans.get(kind)).map(move |index| (kind, index)))
            .map(|(kind, index)| {
                StageSpec::Processor(ProcessorSpec {
                    line,
                    kind,
                    index,
                    language: pipeline.language.clone(),
                    network: network.clone(),
                    ack_timeout_secs,
                })
            })
            .collect();

        let producer = StageSpec::Producer(ProducerSpec {
            line,
            dump: dump.to_path_buf(),
            fans,
            network: network.clone(),
            ack_timeout_secs,
            progress: self.config.logging.progress,
        });

        LineStages {
            sinks,
            processors,
            producer,
        }
    }
}

struct LineStages {
    sinks: Vec<StageSpec>,
    processors: Vec<StageSpec>,
    producer: StageSpec,
}

async fn join(handle: StageHandle) -> Result<StageReport, PipelineError> {
    let name = handle.name().to_string();
    let report = handle.join().await?;
    debug!("{} joined: {:?}", name, report);
    Ok(report)
}

async fn load_namespaces(path: &Path) -> Result<crate::types::NamespaceTable, PipelineError> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || read_namespaces(&owned))
        .await
        .map_err(|e| PipelineError::stage("namespaces", e))?;
    match result {
        Ok(table) => Ok(table),
        Err(DecodeError::MissingNamespaces) => Err(PipelineError::MissingNamespaces(path.display().to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Share files out round-robin; lines without files are left out
pub fn assign_lines(paths: &[PathBuf], lines: usize) -> Vec<Vec<PathBuf>> {
    let lines = lines.max(1).min(paths.len().max(1));
    let mut assignments = vec![Vec::new(); lines];
    for (i, path) in paths.iter().enumerate() {
        assignments[i % lines].push(path.clone());
    }
    assignments.retain(|files| !files.is_empty());
    assignments
}
