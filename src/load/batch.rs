//! Cycle-based batch loader used by every sink
//!
//! Items are staged into one file per table. Every `cache_size` items the
//! loader runs a cycle: each non-empty staged file is bulk-loaded, then
//! emptied. A table load that fails is logged with a replay copy of its file
//! and the sink keeps going.

use super::failures::{FailureLog, FailureRecord};
use super::rows::SinkItem;
use super::staging::StagedFile;
use super::LoadError;
use crate::storage::{Storage, Table};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Counters reported by a finished loader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub items: u64,
    pub cycles: u64,
    pub chunks_loaded: u64,
    pub chunks_failed: u64,
    pub rows_loaded: u64,
}

pub struct BatchLoader {
    name: String,
    storage: Arc<dyn Storage>,
    staging_dir: PathBuf,
    cache_size: usize,
    files: BTreeMap<Table, StagedFile>,
    pending: usize,
    failures: FailureLog,
    stats: LoadStats,
}

impl BatchLoader {
    /// `name` prefixes staged files and identifies the loader in logs,
    /// e.g. `line0-revision`.
    pub fn new(
        name: impl Into<String>,
        storage: Arc<dyn Storage>,
        staging_dir: impl Into<PathBuf>,
        cache_size: usize,
        failures: FailureLog,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            staging_dir: staging_dir.into(),
            cache_size: cache_size.max(1),
            files: BTreeMap::new(),
            pending: 0,
            failures,
            stats: LoadStats::default(),
        }
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Items staged since the last cycle
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Stage one item, running a load cycle when the cache is full
    pub async fn push(&mut self, item: &SinkItem) -> Result<(), LoadError> {
        for (table, values) in item.staged_rows() {
            let staged = match self.files.entry(table) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let path = self
                        .staging_dir
                        .join(format!("{}_{}.tsv", self.name, table.name()));
                    entry.insert(StagedFile::create(path)?)
                }
            };
            staged.append(&values)?;
        }

        self.pending += 1;
        self.stats.items += 1;
        if self.pending >= self.cache_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Load whatever is still staged and remove the staging files
    pub async fn finish(mut self) -> Result<LoadStats, LoadError> {
        self.flush().await?;
        for staged in self.files.values() {
            if let Err(e) = std::fs::remove_file(staged.path()) {
                debug!("Could not remove {}: {}", staged.path().display(), e);
            }
        }
        info!(
            "{}: {} items, {} cycles, {} rows loaded, {} chunks failed",
            self.name,
            self.stats.items,
            self.stats.cycles,
            self.stats.rows_loaded,
            self.stats.chunks_failed
        );
        Ok(self.stats)
    }

    async fn flush(&mut self) -> Result<(), LoadError> {
        if self.pending == 0 {
            return Ok(());
        }
        self.stats.cycles += 1;
        let cycle = self.stats.cycles;

        for (table, staged) in self.files.iter_mut() {
            if staged.rows() == 0 {
                continue;
            }
            staged.flush()?;
            let rows = staged.rows();

            match self.storage.bulk_load(*table, staged.path()).await {
                Ok(loaded) => {
                    debug!("{}: cycle {} loaded {} rows into {}", self.name, cycle, loaded, table);
                    self.stats.chunks_loaded += 1;
                    self.stats.rows_loaded += loaded;
                }
                Err(e) => {
                    error!("{}: cycle {} failed to load {}: {}", self.name, cycle, table, e);
                    self.stats.chunks_failed += 1;
                    let replay_file = preserve(&self.staging_dir, &self.name, *table, cycle, staged.path())?;
                    self.failures.append(&FailureRecord {
                        timestamp: chrono::Utc::now().to_rfc3339(),
                        stage: self.name.clone(),
                        table: *table,
                        cycle,
                        rows,
                        replay_file,
                        error: e.to_string(),
                    })?;
                }
            }
            staged.reset()?;
        }

        self.pending = 0;
        Ok(())
    }
}

/// Copy a staged file under `failed/` so the chunk can be replayed
fn preserve(
    staging_dir: &Path,
    name: &str,
    table: Table,
    cycle: u64,
    staged: &Path,
) -> Result<PathBuf, LoadError> {
    let failed_dir = staging_dir.join("failed");
    std::fs::create_dir_all(&failed_dir).map_err(|e| LoadError::staging(&failed_dir, e))?;
    let target = failed_dir.join(format!("{}_{}_{}.tsv", name, table.name(), cycle));
    std::fs::copy(staged, &target).map_err(|e| LoadError::staging(staged, e))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::rows::{PageRow, RevisionHashRow, RevisionRow, RevisionRows, UserRow};
    use crate::load::staging::read_staged;
    use crate::storage::{SchemaMode, StorageError};
    use crate::types::NamespaceTable;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records each bulk load as (table, rows in the staged file)
    #[derive(Default)]
    struct RecordingStorage {
        loads: Mutex<Vec<(Table, usize)>>,
        fail_table: Option<Table>,
    }

    impl RecordingStorage {
        fn loads(&self) -> Vec<(Table, usize)> {
            self.loads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Storage for RecordingStorage {
        async fn prepare_schema(&self, _mode: SchemaMode) -> Result<(), StorageError> {
            Ok(())
        }

        async fn insert_namespaces(&self, _namespaces: &NamespaceTable) -> Result<(), StorageError> {
            Ok(())
        }

        async fn bulk_load(&self, table: Table, staged: &Path) -> Result<u64, StorageError> {
            let rows = read_staged(staged).unwrap().len();
            self.loads.lock().unwrap().push((table, rows));
            if self.fail_table == Some(table) {
                return Err(StorageError::Staged {
                    path: staged.display().to_string(),
                    message: "constraint violation".to_string(),
                });
            }
            Ok(rows as u64)
        }

        async fn build_indexes(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn page(id: u64) -> SinkItem {
        SinkItem::Page(PageRow {
            page_id: id,
            namespace: 0,
            title: format!("Page {}", id),
            restrictions: String::new(),
        })
    }

    fn revision(id: u64, user: Option<i64>) -> SinkItem {
        SinkItem::Revision(RevisionRows {
            revision: RevisionRow {
                rev_id: id,
                page_id: 1,
                user_id: user.unwrap_or(0),
                timestamp: "2024-01-01 00:00:00".to_string(),
                len: 3,
                parent_id: None,
                redirect: false,
                minor: false,
                featured_article: false,
                featured_list: false,
                good_article: false,
                comment: String::new(),
            },
            hash: RevisionHashRow {
                rev_id: id,
                page_id: 1,
                user_id: user.unwrap_or(0),
                hash: "abc".to_string(),
            },
            user: user.map(|user_id| UserRow {
                user_id,
                user_name: "Alice".to_string(),
            }),
        })
    }

    fn loader(dir: &tempfile::TempDir, storage: Arc<RecordingStorage>, cache_size: usize) -> BatchLoader {
        BatchLoader::new(
            "line0-page",
            storage,
            dir.path().join("staging"),
            cache_size,
            FailureLog::new(dir.path().join("logs/line-0.errors.jsonl")),
        )
    }

    /// Feed `count` page items with a cache of `k`; return (loads before finish, all loads)
    async fn run_pages(k: usize, count: u64) -> (Vec<(Table, usize)>, Vec<(Table, usize)>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage::default());
        let mut loader = loader(&dir, storage.clone(), k);
        for id in 1..=count {
            loader.push(&page(id)).await.unwrap();
        }
        let before = storage.loads();
        loader.finish().await.unwrap();
        (before, storage.loads())
    }

    #[tokio::test]
    async fn test_flush_at_exact_threshold() {
        let (before, all) = run_pages(4, 4).await;
        assert_eq!(before, vec![(Table::Page, 4)]);
        // Nothing left over, so finishing issues no further load
        assert_eq!(all, before);
    }

    #[tokio::test]
    async fn test_flush_threshold_plus_one() {
        let (before, all) = run_pages(4, 5).await;
        assert_eq!(before, vec![(Table::Page, 4)]);
        assert_eq!(all, vec![(Table::Page, 4), (Table::Page, 1)]);
    }

    #[tokio::test]
    async fn test_flush_just_below_two_cycles() {
        let (before, all) = run_pages(4, 7).await;
        assert_eq!(before, vec![(Table::Page, 4)]);
        assert_eq!(all, vec![(Table::Page, 4), (Table::Page, 3)]);
    }

    #[tokio::test]
    async fn test_finish_without_items_loads_nothing() {
        let (before, all) = run_pages(4, 0).await;
        assert!(before.is_empty());
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_revision_cycle_loads_each_table() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage::default());
        let mut loader = loader(&dir, storage.clone(), 2);
        loader.push(&revision(10, Some(7))).await.unwrap();
        loader.push(&revision(11, None)).await.unwrap();

        let mut loads = storage.loads();
        loads.sort();
        assert_eq!(
            loads,
            vec![(Table::Revision, 2), (Table::RevisionHash, 2), (Table::User, 1)]
        );
        let stats = loader.finish().await.unwrap();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.rows_loaded, 5);
    }

    #[tokio::test]
    async fn test_failed_load_is_logged_and_loading_continues() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage {
            fail_table: Some(Table::User),
            ..Default::default()
        });
        let mut loader = loader(&dir, storage.clone(), 1);
        loader.push(&revision(10, Some(7))).await.unwrap();
        loader.push(&revision(11, Some(8))).await.unwrap();
        let stats = loader.finish().await.unwrap();

        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.chunks_failed, 2);
        assert_eq!(stats.chunks_loaded, 4);

        let failures = FailureLog::read(&dir.path().join("logs/line-0.errors.jsonl")).unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].table, Table::User);
        assert_eq!(failures[1].cycle, 2);
        assert!(failures[0].error.contains("constraint violation"));

        let replay = read_staged(&failures[0].replay_file).unwrap();
        assert_eq!(replay, vec![vec![Some("7".to_string()), Some("Alice".to_string())]]);
    }
}
