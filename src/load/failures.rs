//! Per-line log of bulk loads that failed
//!
//! One JSON object per line, each pointing at a preserved copy of the staged
//! file so the chunk can be replayed by hand.

use super::LoadError;
use crate::storage::Table;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: String,
    /// Sink that attempted the load, e.g. `line0-revision`
    pub stage: String,
    pub table: Table,
    pub cycle: u64,
    pub rows: u64,
    /// Copy of the staged file kept for replay
    pub replay_file: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &FailureRecord) -> Result<(), LoadError> {
        let fail = |message: String| LoadError::FailureLog {
            path: self.path.clone(),
            message,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        let mut line = serde_json::to_string(record).map_err(|e| fail(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| fail(e.to_string()))?;
        file.write_all(line.as_bytes()).map_err(|e| fail(e.to_string()))
    }

    /// Read back every record; a missing log means no failures
    pub fn read(path: &Path) -> Result<Vec<FailureRecord>, LoadError> {
        let fail = |message: String| LoadError::FailureLog {
            path: path.to_path_buf(),
            message,
        };
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(fail(e.to_string())),
        };
        BufReader::new(file)
            .lines()
            .map(|line| {
                let line = line.map_err(|e| fail(e.to_string()))?;
                serde_json::from_str(&line).map_err(|e| fail(e.to_string()))
            })
            .collect()
    }
}
