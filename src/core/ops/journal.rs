//! core::ops::journal
//!
//! Merge journal for staging → live tree merges.
//!
//! # Architecture
//!
//! A deploy never writes into the live tree directly. It builds a staging
//! tree that mirrors the install root and then merges it with a recursive
//! copy-with-overwrite. That merge is not atomic, so it is journaled:
//!
//! 1. Before the first copy the journal lists every staged file as
//!    `pending` with phase `in_progress` (fsync'd)
//! 2. On success every entry is `merged` and the phase `committed`; the
//!    journal and staging tree are then removed
//! 3. On failure the entries merged so far are recorded, the phase becomes
//!    `failed`, and the staging tree is kept for resume or discard
//!
//! # Storage
//!
//! - `<storage>/journals/<op_id>.json`
//! - `<storage>/staging/<op_id>/` - the staging tree the journal refers to
//!
//! # Example
//!
//! ```ignore
//! let mut journal = MergeJournal::new(OpId::new(), "deploy");
//! journal.record_pending(staged_files);
//! journal.write(&paths)?;
//! for entry in journal.pending_paths() { /* copy */ }
//! journal.commit();
//! journal.write(&paths)?;
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::paths::GamePaths;
use crate::core::registry::DeployedModRecord;
use crate::core::store::{self, StoreError};
use crate::core::types::{RelPath, UtcTimestamp};

/// Errors from journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Reading or writing the journal document failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Listing the journals directory failed.
    #[error("failed to list journals in '{}': {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Journal file not found.
    #[error("journal not found: {0}")]
    NotFound(String),

    /// Journal cannot be used for the requested action.
    #[error("invalid journal state: {0}")]
    InvalidState(String),
}

/// Unique identifier for a staged operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(String);

impl OpId {
    /// Generate a new unique operation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an OpId from an existing string, e.g. a CLI argument.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The current phase of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePhase {
    /// Merge has started and has not finished.
    InProgress,
    /// Every staged file reached the live tree.
    Committed,
    /// Merge stopped partway; staging is kept.
    Failed,
}

impl MergePhase {
    /// A journal in this phase still needs resume or discard.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, MergePhase::InProgress | MergePhase::Failed)
    }
}

/// Whether a staged file has reached the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Merged,
}

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEntry {
    pub path: RelPath,
    pub state: EntryState,
}

/// Journal of one staging → live merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeJournal {
    pub op_id: OpId,
    /// Operation that produced the staging tree (`deploy`, `update`, ...).
    pub command: String,
    pub phase: MergePhase,
    pub started_at: UtcTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<UtcTimestamp>,
    /// Registry record to apply once the merge completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<DeployedModRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub entries: Vec<MergeEntry>,
}

impl MergeJournal {
    pub fn new(op_id: OpId, command: impl Into<String>) -> Self {
        Self {
            op_id,
            command: command.into(),
            phase: MergePhase::InProgress,
            started_at: UtcTimestamp::now(),
            finished_at: None,
            record: None,
            error: None,
            entries: Vec::new(),
        }
    }

    /// Attach the Registry record applied on completion.
    pub fn with_record(mut self, record: DeployedModRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Add staged files as pending entries.
    pub fn record_pending(&mut self, paths: impl IntoIterator<Item = RelPath>) {
        self.entries.extend(paths.into_iter().map(|path| MergeEntry {
            path,
            state: EntryState::Pending,
        }));
    }

    /// Mark one entry as merged. Returns `false` if the path is not listed.
    pub fn mark_merged(&mut self, path: &RelPath) -> bool {
        match self.entries.iter_mut().find(|e| &e.path == path) {
            Some(entry) => {
                entry.state = EntryState::Merged;
                true
            }
            None => false,
        }
    }

    /// Entries still waiting to be merged, in staging order.
    pub fn pending_paths(&self) -> Vec<RelPath> {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Pending)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn merged_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Merged)
            .count()
    }

    /// Mark the merge as complete.
    pub fn commit(&mut self) {
        for entry in &mut self.entries {
            entry.state = EntryState::Merged;
        }
        self.phase = MergePhase::Committed;
        self.error = None;
        self.finished_at = Some(UtcTimestamp::now());
    }

    /// Mark the merge as stopped partway.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.phase = MergePhase::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(UtcTimestamp::now());
    }

    /// Put a failed journal back in progress before resuming it.
    pub fn reopen(&mut self) {
        self.phase = MergePhase::InProgress;
        self.error = None;
        self.finished_at = None;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the journal with fsync.
    pub fn write(&self, paths: &GamePaths) -> Result<(), JournalError> {
        store::write_json(&paths.journal_path(self.op_id.as_str()), self)?;
        Ok(())
    }

    /// Read a journal by id.
    pub fn read(paths: &GamePaths, op_id: &OpId) -> Result<Self, JournalError> {
        store::read_json(&paths.journal_path(op_id.as_str()))?
            .ok_or_else(|| JournalError::NotFound(op_id.to_string()))
    }

    /// List journal ids, oldest first.
    pub fn list(paths: &GamePaths) -> Result<Vec<OpId>, JournalError> {
        let dir = paths.journals_dir();
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JournalError::List { path: dir, source: e }),
        };

        let mut entries: Vec<_> = read_dir
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?;
                let mtime = entry.metadata().ok()?.modified().ok()?;
                Some((mtime, OpId::from_string(id)))
            })
            .collect();
        entries.sort();

        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }

    /// Delete this journal from disk.
    pub fn delete(&self, paths: &GamePaths) -> Result<(), JournalError> {
        store::remove_json(&paths.journal_path(self.op_id.as_str()))?;
        Ok(())
    }

    /// Staging tree this journal refers to.
    pub fn staging_dir(&self, paths: &GamePaths) -> PathBuf {
        paths.staging_dir(self.op_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths(temp: &TempDir) -> GamePaths {
        GamePaths::new(
            temp.path().join("install"),
            temp.path().join("storage"),
            ".modweave",
        )
    }

    fn rel(s: &str) -> RelPath {
        RelPath::new(s).unwrap()
    }

    mod phase {
        use super::*;

        #[test]
        fn recovery_needed() {
            assert!(MergePhase::InProgress.needs_recovery());
            assert!(MergePhase::Failed.needs_recovery());
            assert!(!MergePhase::Committed.needs_recovery());
        }

        #[test]
        fn serializes_snake_case() {
            assert_eq!(
                serde_json::to_string(&MergePhase::InProgress).unwrap(),
                "\"in_progress\""
            );
            assert_eq!(
                serde_json::to_string(&EntryState::Pending).unwrap(),
                "\"pending\""
            );
        }
    }

    mod entries {
        use super::*;

        #[test]
        fn pending_then_merged() {
            let mut journal = MergeJournal::new(OpId::new(), "deploy");
            journal.record_pending(vec![rel("a.txt"), rel("b/c.txt")]);
            assert_eq!(journal.pending_paths().len(), 2);

            assert!(journal.mark_merged(&rel("a.txt")));
            assert!(!journal.mark_merged(&rel("zzz")));
            assert_eq!(journal.pending_paths(), vec![rel("b/c.txt")]);
            assert_eq!(journal.merged_count(), 1);
        }

        #[test]
        fn commit_merges_everything() {
            let mut journal = MergeJournal::new(OpId::new(), "deploy");
            journal.record_pending(vec![rel("a"), rel("b")]);
            journal.fail("disk full");
            assert_eq!(journal.phase, MergePhase::Failed);
            journal.commit();
            assert_eq!(journal.phase, MergePhase::Committed);
            assert!(journal.pending_paths().is_empty());
            assert!(journal.error.is_none());
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn write_read_delete() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);

            let mut journal = MergeJournal::new(OpId::new(), "deploy");
            journal.record_pending(vec![rel("x/y.png")]);
            journal.write(&paths).unwrap();

            let loaded = MergeJournal::read(&paths, &journal.op_id).unwrap();
            assert_eq!(loaded, journal);
            assert_eq!(MergeJournal::list(&paths).unwrap(), vec![journal.op_id.clone()]);

            journal.delete(&paths).unwrap();
            assert!(MergeJournal::list(&paths).unwrap().is_empty());
        }

        #[test]
        fn read_missing_is_not_found() {
            let temp = TempDir::new().unwrap();
            let paths = test_paths(&temp);
            let result = MergeJournal::read(&paths, &OpId::from_string("nope"));
            assert!(matches!(result, Err(JournalError::NotFound(_))));
        }

        #[test]
        fn list_without_dir_is_empty() {
            let temp = TempDir::new().unwrap();
            assert!(MergeJournal::list(&test_paths(&temp)).unwrap().is_empty());
        }
    }
}
