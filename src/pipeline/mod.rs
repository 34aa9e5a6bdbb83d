//! Multi-stage ETL pipeline
//!
//! A run is split into independent lines. Each line works through its dump
//! files one at a time with a producer, a fan of processors per record kind
//! and one sink per record kind, all talking over the TCP transport.
//!
//! ```text
//!              ┌─► processor ─┐
//!  producer ───┼─► processor ─┼──► sink ──► BatchLoader ──► storage
//!  (decoder)   └─► processor ─┘  (fan-in)
//!       │               ▲
//!       └──── Stop ─────┘
//! ```

pub mod launcher;
pub mod orchestrator;
pub mod processor;
pub mod producer;
pub mod sink;
pub mod stage;

pub use launcher::{Launcher, ProcessLauncher, StageHandle, TaskLauncher};
pub use orchestrator::{LineReport, Orchestrator, RunReport, RunState};
pub use stage::{run_stage, Fans, ProcessorSpec, ProducerSpec, SinkSpec, StageReport, StageSpec};

use crate::import::DecodeError;
use crate::load::LoadError;
use crate::storage::StorageError;
use crate::transform::TransformError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a stage or the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dump {0} has no namespace table")]
    MissingNamespaces(String),
}

impl PipelineError {
    pub(crate) fn stage(stage: impl Into<String>, message: impl ToString) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}
