//! engine::recovery
//!
//! Resume or discard merges that stopped partway.
//!
//! A deploy whose merge fails leaves its journal (phase `failed`) and its
//! staging tree behind. A process that died mid-merge leaves the journal in
//! phase `in_progress`. Both show up in [`DeploymentEngine::pending_merges`].
//!
//! - Resume re-copies the pending files, applies the recorded Registry
//!   change and cleans up, exactly as a successful deploy would have
//! - Discard moves the staging tree into trash and deletes the journal.
//!   Files already merged stay in the live tree. Backups merge before the
//!   content they protect, so a displaced game file is either untouched or
//!   already backed up.

use crate::core::ops::journal::{JournalError, MergeJournal, OpId};

use super::{DeploymentEngine, EngineError, Trash};

impl DeploymentEngine {
    /// Journals that still need resume or discard, oldest first.
    pub fn pending_merges(&self) -> Result<Vec<MergeJournal>, EngineError> {
        let mut pending = Vec::new();
        for op_id in MergeJournal::list(self.paths())? {
            match MergeJournal::read(self.paths(), &op_id) {
                Ok(journal) if journal.phase.needs_recovery() => pending.push(journal),
                Ok(_) => {}
                Err(e) => tracing::warn!(op_id = %op_id, error = %e, "skipping unreadable journal"),
            }
        }
        Ok(pending)
    }

    /// Finish an interrupted merge from its kept staging tree.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the journal or its staging tree is gone
    /// - [`EngineError::Conflict`] if the journal already committed
    /// - Any merge error; the journal is marked `failed` again
    pub fn resume_merge(&self, op_id: &OpId) -> Result<(), EngineError> {
        let _lock = self.lock()?;
        let mut journal = self.read_journal(op_id)?;
        if !journal.phase.needs_recovery() {
            return Err(EngineError::Conflict(format!(
                "merge {} is already committed",
                op_id
            )));
        }
        let staging_dir = journal.staging_dir(self.paths());
        if !staging_dir.is_dir() {
            return Err(EngineError::NotFound(format!(
                "staging tree for merge {} ({})",
                op_id,
                staging_dir.display()
            )));
        }

        let pending = journal.pending_paths().len();
        journal.reopen();
        self.merge_staging(&mut journal)?;
        self.finish_merge(journal)?;
        tracing::info!(op_id = %op_id, files = pending, "resumed merge");
        Ok(())
    }

    /// Drop an interrupted merge without touching the live tree.
    ///
    /// Returns the trash folder holding the staging tree, if one existed.
    pub fn discard_merge(&self, op_id: &OpId) -> Result<Option<std::path::PathBuf>, EngineError> {
        let _lock = self.lock()?;
        let journal = self.read_journal(op_id)?;

        let staging_dir = journal.staging_dir(self.paths());
        let mut trash = Trash::new(self.paths());
        if staging_dir.exists() {
            trash.take_dir(&staging_dir, format!("staging/{}", op_id))?;
        }
        journal.delete(self.paths())?;

        tracing::info!(
            op_id = %op_id,
            merged = journal.merged_count(),
            "discarded merge"
        );
        Ok(trash.into_used())
    }

    fn read_journal(&self, op_id: &OpId) -> Result<MergeJournal, EngineError> {
        let valid = !op_id.as_str().is_empty()
            && op_id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(EngineError::Validation(format!("invalid operation id '{}'", op_id)));
        }
        MergeJournal::read(self.paths(), op_id).map_err(|e| match e {
            JournalError::NotFound(id) => EngineError::NotFound(format!("merge journal {}", id)),
            other => other.into(),
        })
    }
}
