//! Batched bulk loading of transformed rows
//!
//! ```text
//!  SinkItem ──► BatchLoader ──► StagedFile per table ──► Storage::bulk_load
//!                  │  (cache_size items per cycle)           │ failure
//!                  └──────────────────────────────────────► FailureLog + replay copy
//! ```

pub mod batch;
pub mod failures;
pub mod rows;
pub mod staging;

pub use batch::{BatchLoader, LoadStats};
pub use failures::{FailureLog, FailureRecord};
pub use rows::SinkItem;
pub use staging::{StagedFile, Value};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that stop a sink. Failed bulk loads are not among them; those are
/// recorded in the failure log.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Staging file {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed staged row at {}:{line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failure log {}: {message}", path.display())]
    FailureLog { path: PathBuf, message: String },
}

impl LoadError {
    pub(crate) fn staging(path: &Path, source: std::io::Error) -> Self {
        LoadError::Staging {
            path: path.to_path_buf(),
            source,
        }
    }
}
