//! Stage launchers
//!
//! Stages never share memory: a [`TaskLauncher`] runs them as tokio tasks of
//! the orchestrator, a [`ProcessLauncher`] re-executes the binary once per
//! stage. Either way they only talk through the transport.

use super::stage::{run_stage, StageReport, StageSpec};
use super::PipelineError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start a stage without waiting for it
    async fn launch(&self, spec: StageSpec) -> Result<StageHandle, PipelineError>;
}

/// Aborts the stage task when dropped
struct TaskGuard(JoinHandle<Result<StageReport, PipelineError>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Running {
    Task(TaskGuard),
    /// Spawned with `kill_on_drop`
    Process(Child),
}

/// A launched stage. Dropping it aborts the task or kills the process.
pub struct StageHandle {
    name: String,
    running: Running,
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the stage and collect its report
    pub async fn join(self) -> Result<StageReport, PipelineError> {
        let name = self.name;
        match self.running {
            Running::Task(mut guard) => match (&mut guard.0).await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::stage(name, e)),
            },
            Running::Process(child) => {
                let output = child.wait_with_output().await?;
                if !output.status.success() {
                    return Err(PipelineError::stage(name, format!("exited with {}", output.status)));
                }
                let stdout = String::from_utf8_lossy(&output.stdout);
                let line = stdout
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .ok_or_else(|| PipelineError::stage(name.as_str(), "no report on stdout"))?;
                Ok(serde_json::from_str(line)?)
            }
        }
    }
}

/// Runs every stage as a task of the current runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLauncher;

#[async_trait]
impl Launcher for TaskLauncher {
    async fn launch(&self, spec: StageSpec) -> Result<StageHandle, PipelineError> {
        let name = spec.name();
        debug!("Spawning task {}", name);
        Ok(StageHandle {
            name,
            running: Running::Task(TaskGuard(tokio::spawn(run_stage(spec)))),
        })
    }
}

/// Runs every stage as `<program> stage --spec <json>`
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config: Option<PathBuf>,
    log_filter: Option<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config: None,
            log_filter: None,
        }
    }

    /// Launcher re-executing the running binary
    pub fn current() -> Result<Self, PipelineError> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Config file the children load their logging settings from
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    /// `RUST_LOG` directive passed to the children
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    fn command(&self, spec_json: String) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(config) = &self.config {
            command.arg("--config").arg(config);
        }
        command
            .arg("stage")
            .arg("--spec")
            .arg(spec_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(filter) = &self.log_filter {
            command.env("RUST_LOG", filter);
        }
        command
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, spec: StageSpec) -> Result<StageHandle, PipelineError> {
        let name = spec.name();
        let child = self.command(serde_json::to_string(&spec)?).spawn()?;
        debug!("Spawned {} as pid {:?}", name, child.id());
        Ok(StageHandle {
            name,
            running: Running::Process(child),
        })
    }
}
