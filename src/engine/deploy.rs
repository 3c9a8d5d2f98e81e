//! engine::deploy
//!
//! Deploy a stored mod into the live tree.
//!
//! # Architecture
//!
//! ```text
//! integrity check -> stage every file (copy_mod_file) -> journal -> merge -> Registry
//! ```
//!
//! All file and lineage changes are first written to a staging tree at
//! `<storage>/staging/<opId>/`, which mirrors the install root. Only when
//! every file has been staged is the tree merged into the live install,
//! under a [`MergeJournal`]. Game backups are merged first and content
//! before the remaining bookkeeping files. An interrupted merge therefore
//! never overwrites a game file whose backup is not in place, and never
//! records an owner whose bytes did not arrive.
//!
//! # Conflict resolution per file
//!
//! 1. No live file, no lineage: the mod becomes the sole owner
//! 2. Live file, no lineage: an untracked game file. It is backed up once,
//!    and the lineage is seeded with `[GAME, mod]`
//! 3. Lineage exists: ordered insert by live load order. Position `0` means
//!    the mod wins and its file is staged. Anything else means it is
//!    shadowed; only the lineage changes
//!
//! Either way the updated lineage is staged. When the live file has drifted
//! from what the lineage says, the expected owner's content is staged too.

use std::path::{Path, PathBuf};

use crate::core::fsops;
use crate::core::hash::{self, Probe};
use crate::core::lineage::{FileLineage, FileVersion};
use crate::core::manifest::{ManifestFile, ModManifest};
use crate::core::ops::journal::{MergeJournal, OpId};
use crate::core::paths::GamePaths;
use crate::core::registry::{DeployedModRecord, GameState};
use crate::core::types::{LoadOrder, ModId, OwnerId, Priority, RelPath};

use super::{DeploymentEngine, EngineError};

/// Outcome of a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub mod_id: ModId,
    pub load_order: LoadOrder,
    pub op_id: OpId,
    /// Paths where the mod became the live owner.
    pub won: Vec<RelPath>,
    /// Paths where a higher-priority owner stays live.
    pub shadowed: Vec<RelPath>,
    /// Paths whose live content had drifted and was restored.
    pub repaired: Vec<RelPath>,
    /// Untracked game files backed up by this deploy.
    pub backed_up: Vec<RelPath>,
}

impl DeployReport {
    fn new(mod_id: ModId, load_order: LoadOrder, op_id: OpId) -> Self {
        Self {
            mod_id,
            load_order,
            op_id,
            won: Vec::new(),
            shadowed: Vec::new(),
            repaired: Vec::new(),
            backed_up: Vec::new(),
        }
    }
}

/// Everything copy_mod_file needs for one deploy.
struct Staging<'a> {
    manifest: &'a ModManifest,
    owner: OwnerId,
    load_order: LoadOrder,
    state: &'a GameState,
    source: PathBuf,
    staged: GamePaths,
}

impl Staging<'_> {
    /// Live priority, with the deploying mod at its target load order.
    fn priority_of(&self, owner: &OwnerId) -> Priority {
        match owner.as_mod() {
            Some(id) if id == &self.manifest.id => Priority::Mod(self.load_order),
            _ => self.state.priority_of(owner),
        }
    }
}

impl DeploymentEngine {
    /// Deploy a stored mod.
    ///
    /// The load order is taken from the manifest when set, else the mod
    /// keeps its current slot, else it goes after every deployed mod.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Lock`] if the install is busy (no side effects)
    /// - [`EngineError::Integrity`] if a stored file does not match the
    ///   manifest (no side effects)
    /// - Any staging or merge error. Staging is kept for recovery.
    pub fn deploy(&self, manifest: &ModManifest) -> Result<DeployReport, EngineError> {
        let _lock = self.lock()?;
        let load_order = if manifest.load_order > 0 {
            manifest.load_order
        } else {
            let state = GameState::load(self.paths())?;
            state
                .load_order_of(&manifest.id)
                .unwrap_or_else(|| state.next_load_order())
        };
        self.deploy_locked(manifest, load_order)
    }

    /// Deploy a stored mod by id.
    pub fn deploy_id(&self, id: &ModId) -> Result<DeployReport, EngineError> {
        let manifest = self.stored_manifest(id)?;
        self.deploy(&manifest)
    }

    pub(crate) fn deploy_locked(
        &self,
        manifest: &ModManifest,
        load_order: LoadOrder,
    ) -> Result<DeployReport, EngineError> {
        if manifest.game_id != self.game().id {
            return Err(EngineError::Validation(format!(
                "mod '{}' was compiled for game '{}', not '{}'",
                manifest.id,
                manifest.game_id,
                self.game().id
            )));
        }
        if load_order == 0 {
            return Err(EngineError::Validation("load order must be at least 1".into()));
        }
        let source = self.paths().stored_mod_dir(&manifest.id);
        if !source.is_dir() {
            return Err(EngineError::Validation(format!(
                "stored files for mod '{}' are missing",
                manifest.id
            )));
        }
        if let Some(file) = manifest.files.iter().find(|f| self.paths().is_internal(&f.file_path)) {
            return Err(EngineError::Validation(format!(
                "file '{}' would overwrite modweave's own records",
                file.file_path
            )));
        }
        self.check_integrity(manifest, &source)?;

        let state = GameState::load(self.paths())?;
        let op_id = OpId::new();
        let staging_dir = self.paths().staging_dir(op_id.as_str());
        let mut deployed = manifest.clone();
        deployed.load_order = load_order;

        let ctx = Staging {
            manifest,
            owner: OwnerId::Mod(manifest.id.clone()),
            load_order,
            state: &state,
            source,
            staged: self.paths().with_install_root(&staging_dir),
        };
        let mut report = DeployReport::new(manifest.id.clone(), load_order, op_id.clone());

        let staged = manifest
            .files
            .iter()
            .try_for_each(|file| self.copy_mod_file(&ctx, file, &mut report))
            .and_then(|()| Ok(deployed.write(&ctx.staged.manifest_path(&manifest.id))?))
            .and_then(|()| self.staged_entries(&staging_dir));
        let entries = match staged {
            Ok(entries) => entries,
            Err(e) => {
                self.abandon_staging(&staging_dir, &e);
                return Err(e);
            }
        };

        let mut journal = MergeJournal::new(op_id, "deploy")
            .with_record(DeployedModRecord::from_manifest(&deployed));
        journal.record_pending(entries);
        self.merge_staging(&mut journal)?;
        self.finish_merge(journal)?;

        tracing::info!(
            mod_id = %manifest.id,
            load_order,
            won = report.won.len(),
            shadowed = report.shadowed.len(),
            "deployed mod"
        );
        Ok(report)
    }

    /// Verify every stored file against the manifest before anything moves.
    fn check_integrity(&self, manifest: &ModManifest, source: &Path) -> Result<(), EngineError> {
        for file in &manifest.files {
            let path = file.file_path.under(source);
            let digest = match hash::probe(&path).map_err(|e| EngineError::io(&path, e))? {
                Probe::Present(digest) => digest,
                Probe::Absent => {
                    return Err(EngineError::Integrity {
                        path: file.file_path.clone(),
                        expected: file.hash.to_string(),
                        actual: "missing file".into(),
                    })
                }
            };
            if digest.hash != file.hash || digest.size != file.size {
                return Err(EngineError::Integrity {
                    path: file.file_path.clone(),
                    expected: format!("{} ({} bytes)", file.hash, file.size),
                    actual: format!("{} ({} bytes)", digest.hash, digest.size),
                });
            }
        }
        Ok(())
    }

    /// Stage one file and its lineage.
    fn copy_mod_file(
        &self,
        ctx: &Staging<'_>,
        file: &ManifestFile,
        report: &mut DeployReport,
    ) -> Result<(), EngineError> {
        let rel = &file.file_path;
        let live = self.paths().live_path(rel);
        let candidate = rel.under(&ctx.source);
        let entry = FileVersion::new(ctx.owner.clone(), file.hash.clone());

        let mut lineage = match FileLineage::load(self.paths(), rel)? {
            Some(lineage) => lineage,
            None => {
                let mut lineage = FileLineage::new();
                match hash::probe(&live).map_err(|e| EngineError::io(&live, e))? {
                    Probe::Absent => {}
                    Probe::Present(original) => {
                        self.stage_backup(ctx, rel, &live, report)?;
                        lineage.push_version(OwnerId::Game, original.hash);
                    }
                }
                lineage.push_version(ctx.owner.clone(), file.hash.clone());
                fsops::copy_file(&candidate, &ctx.staged.live_path(rel))?;
                report.won.push(rel.clone());
                lineage.save(&ctx.staged, rel)?;
                return Ok(());
            }
        };

        let previous_top = lineage.peek().cloned();
        let position = lineage.insert_ordered_version(entry, |owner| ctx.priority_of(owner));

        if lineage.contains(&OwnerId::Game) && !self.paths().backup_path(rel).exists() {
            self.repair_backup(ctx, rel, &lineage, &live, report)?;
        }

        if position == 0 {
            if let Some(prev) = previous_top.filter(|p| p.owner != ctx.owner) {
                let current = hash::probe(&live).map_err(|e| EngineError::io(&live, e))?;
                if current.digest().map(|d| &d.hash) != Some(&prev.hash) {
                    tracing::warn!(
                        path = %rel,
                        owner = %prev.owner,
                        "live file drifted from its recorded owner; replacing with new top"
                    );
                    report.repaired.push(rel.clone());
                }
            }
            fsops::copy_file(&candidate, &ctx.staged.live_path(rel))?;
            report.won.push(rel.clone());
        } else {
            tracing::debug!(path = %rel, position, "mod shadowed at path");
            self.repair_drift(ctx, rel, &lineage, &live, report)?;
            report.shadowed.push(rel.clone());
        }

        lineage.save(&ctx.staged, rel)?;
        Ok(())
    }

    /// Back up an untracked game file, once.
    fn stage_backup(
        &self,
        ctx: &Staging<'_>,
        rel: &RelPath,
        live: &Path,
        report: &mut DeployReport,
    ) -> Result<(), EngineError> {
        if self.paths().backup_path(rel).exists() {
            tracing::debug!(path = %rel, "backup already present; keeping it");
            return Ok(());
        }
        fsops::copy_file(live, &ctx.staged.backup_path(rel))?;
        report.backed_up.push(rel.clone());
        Ok(())
    }

    /// Re-create a lost backup from the live file when it still holds the
    /// recorded game bytes.
    fn repair_backup(
        &self,
        ctx: &Staging<'_>,
        rel: &RelPath,
        lineage: &FileLineage,
        live: &Path,
        report: &mut DeployReport,
    ) -> Result<(), EngineError> {
        let Some(game) = lineage.version_of(&OwnerId::Game) else {
            return Ok(());
        };
        let current = hash::probe(live).map_err(|e| EngineError::io(live, e))?;
        if current.digest().map(|d| &d.hash) == Some(&game.hash) {
            tracing::warn!(path = %rel, "game backup missing; re-creating it from the live file");
            fsops::copy_file(live, &ctx.staged.backup_path(rel))?;
            report.backed_up.push(rel.clone());
        } else {
            tracing::warn!(path = %rel, "game backup missing and live file differs; original content is unrecoverable");
        }
        Ok(())
    }

    /// When the live file no longer matches the lineage top, stage the top
    /// owner's content so the merge restores it.
    fn repair_drift(
        &self,
        ctx: &Staging<'_>,
        rel: &RelPath,
        lineage: &FileLineage,
        live: &Path,
        report: &mut DeployReport,
    ) -> Result<(), EngineError> {
        let Some(top) = lineage.peek() else {
            return Ok(());
        };
        let current = hash::probe(live).map_err(|e| EngineError::io(live, e))?;
        if current.digest().map(|d| &d.hash) == Some(&top.hash) {
            return Ok(());
        }

        let source = self.content_source(&top.owner, rel);
        let available = hash::probe(&source).map_err(|e| EngineError::io(&source, e))?;
        if available.digest().map(|d| &d.hash) != Some(&top.hash) {
            tracing::warn!(
                path = %rel,
                owner = %top.owner,
                "live file drifted and the owner's content is unavailable; leaving it"
            );
            return Ok(());
        }

        tracing::warn!(path = %rel, owner = %top.owner, "live file drifted; restoring owner's content");
        fsops::copy_file(&source, &ctx.staged.live_path(rel))?;
        report.repaired.push(rel.clone());
        Ok(())
    }

    /// Staged files in merge order: game backups, then content, then the
    /// lineages and records that describe it.
    fn staged_entries(&self, staging_dir: &Path) -> Result<Vec<RelPath>, EngineError> {
        let mut entries = Vec::new();
        for path in fsops::list_files(staging_dir)? {
            let rel = RelPath::from_path(&path).map_err(|e| {
                EngineError::Validation(format!("unusable staged path '{}': {}", path.display(), e))
            })?;
            entries.push(rel);
        }
        entries.sort_by_key(|rel| {
            if self.paths().is_backup(rel) {
                0
            } else if self.paths().is_internal(rel) {
                2
            } else {
                1
            }
        });
        Ok(entries)
    }

    fn abandon_staging(&self, staging_dir: &Path, error: &EngineError) {
        if !staging_dir.exists() {
            return;
        }
        if self.config().keep_staging_on_failure() {
            tracing::warn!(staging = %staging_dir.display(), %error, "deploy failed; staging kept for inspection");
        } else if let Err(e) = fsops::remove_tree(staging_dir) {
            tracing::warn!(staging = %staging_dir.display(), error = %e, "failed to remove staging");
        }
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Copy every pending staged file into the live tree.
    ///
    /// The journal is written before the first copy. On failure it records
    /// the files merged so far with phase `failed` and the staging tree is
    /// left in place.
    pub(crate) fn merge_staging(&self, journal: &mut MergeJournal) -> Result<(), EngineError> {
        let staging_dir = journal.staging_dir(self.paths());
        journal.write(self.paths())?;

        for rel in journal.pending_paths() {
            let result = self.merge_one(&staging_dir, &rel, journal.merged_count());
            if let Err(e) = result {
                self.record_merge_failure(journal, &e);
                return Err(e);
            }
            journal.mark_merged(&rel);
        }

        if self.config().verify_after_merge() {
            if let Err(e) = self.verify_merged(journal) {
                self.record_merge_failure(journal, &e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn merge_one(&self, staging_dir: &Path, rel: &RelPath, merged: usize) -> Result<(), EngineError> {
        let live = self.paths().live_path(rel);
        #[cfg(any(test, feature = "fault_injection"))]
        super::engine_hooks::check_merge(merged).map_err(|e| EngineError::io(&live, e))?;
        #[cfg(not(any(test, feature = "fault_injection")))]
        let _ = merged;
        fsops::copy_file(&rel.under(staging_dir), &live)?;
        Ok(())
    }

    fn record_merge_failure(&self, journal: &mut MergeJournal, error: &EngineError) {
        journal.fail(error.to_string());
        if let Err(e) = journal.write(self.paths()) {
            tracing::error!(op_id = %journal.op_id, error = %e, "failed to record merge failure in journal");
        }
        tracing::error!(
            op_id = %journal.op_id,
            merged = journal.merged_count(),
            pending = journal.pending_paths().len(),
            %error,
            "merge into live tree failed; staging kept for recovery"
        );
    }

    /// Re-hash every merged content file against its staged lineage top.
    fn verify_merged(&self, journal: &MergeJournal) -> Result<(), EngineError> {
        let staging_dir = journal.staging_dir(self.paths());
        let staged = self.paths().with_install_root(&staging_dir);
        let prefix = format!("{}/lineages/", self.paths().manager_dir_name());

        for entry in &journal.entries {
            let Some(rel) = entry
                .path
                .as_str()
                .strip_prefix(&prefix)
                .and_then(|s| s.strip_suffix(".json"))
                .and_then(|s| RelPath::new(s).ok())
            else {
                continue;
            };
            // Only paths whose content was part of this merge.
            if !journal.entries.iter().any(|e| e.path == rel) {
                continue;
            }
            let Some(lineage) = FileLineage::load(&staged, &rel)? else {
                continue;
            };
            let Some(top) = lineage.peek() else { continue };
            let live = self.paths().live_path(&rel);
            let current = hash::probe(&live).map_err(|e| EngineError::io(&live, e))?;
            match current.digest() {
                Some(d) if d.hash == top.hash => {}
                Some(d) => {
                    return Err(EngineError::Integrity {
                        path: rel,
                        expected: top.hash.to_string(),
                        actual: d.hash.to_string(),
                    })
                }
                None => {
                    return Err(EngineError::Integrity {
                        path: rel,
                        expected: top.hash.to_string(),
                        actual: "missing file".into(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Apply the recorded Registry change, commit, and clean up.
    pub(crate) fn finish_merge(&self, mut journal: MergeJournal) -> Result<(), EngineError> {
        if let Some(record) = journal.record.clone() {
            let mut state = GameState::load(self.paths())?;
            state.append_replace(record);
            state.save(self.paths())?;
        }
        journal.commit();
        journal.write(self.paths())?;
        journal.delete(self.paths())?;
        fsops::remove_tree(&journal.staging_dir(self.paths()))?;
        tracing::debug!(op_id = %journal.op_id, files = journal.entries.len(), "merge committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::game::Game;
    use crate::core::manifest::ModMetadata;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        engine: DeploymentEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let game = Game::new("g", temp.path().join("install"), temp.path().join("storage"));
            fs::create_dir_all(&game.install_root).unwrap();
            let engine = DeploymentEngine::new(Config::default(), game);
            Self { temp, engine }
        }

        fn compile(&self, name: &str, files: &[(&str, &str)]) -> ModManifest {
            let dir = self.temp.path().join("src").join(name);
            for (rel, body) in files {
                let path = dir.join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, body).unwrap();
            }
            self.engine.compile(&dir, ModMetadata::new(name, "1")).unwrap()
        }

        fn live(&self, rel: &str) -> PathBuf {
            self.engine.game().install_root.join(rel)
        }

        fn lineage(&self, rel: &str) -> Option<FileLineage> {
            self.engine.lineage_of(&RelPath::new(rel).unwrap()).unwrap()
        }
    }

    #[test]
    fn fresh_path_gets_sole_owner() {
        let fx = Fixture::new();
        let m = fx.compile("a", &[("data/new.txt", "A")]);
        let report = fx.engine.deploy(&m).unwrap();

        assert_eq!(report.load_order, 1);
        assert_eq!(report.won.len(), 1);
        assert_eq!(fs::read_to_string(fx.live("data/new.txt")).unwrap(), "A");
        let lineage = fx.lineage("data/new.txt").unwrap();
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage.peek().unwrap().owner, OwnerId::Mod(m.id.clone()));
        assert!(fx.engine.paths().manifest_path(&m.id).exists());
    }

    #[test]
    fn untracked_game_file_is_backed_up() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.live("t")).unwrap();
        fs::write(fx.live("t/x.png"), "vanilla").unwrap();
        let m = fx.compile("a", &[("t/x.png", "A")]);

        let report = fx.engine.deploy(&m).unwrap();

        assert_eq!(report.backed_up.len(), 1);
        let backup = fx.engine.paths().backup_path(&RelPath::new("t/x.png").unwrap());
        assert_eq!(fs::read_to_string(backup).unwrap(), "vanilla");
        let lineage = fx.lineage("t/x.png").unwrap();
        assert!(lineage.versions()[0].owner.is_game());
        assert_eq!(lineage.len(), 2);
    }

    #[test]
    fn lower_priority_mod_is_shadowed() {
        let fx = Fixture::new();
        let a = fx.compile("a", &[("f.txt", "A")]);
        let b = fx.compile("b", &[("f.txt", "B")]);
        let mut b_high = b.clone();
        b_high.load_order = 5;
        fx.engine.deploy(&b_high).unwrap();

        let mut a_low = a.clone();
        a_low.load_order = 1;
        let report = fx.engine.deploy(&a_low).unwrap();
        assert_eq!(report.shadowed.len(), 1);
        assert_eq!(fs::read_to_string(fx.live("f.txt")).unwrap(), "B");
        let owners: Vec<_> = fx
            .lineage("f.txt")
            .unwrap()
            .versions()
            .iter()
            .map(|v| v.owner.clone())
            .collect();
        assert_eq!(owners, vec![OwnerId::Mod(a.id), OwnerId::Mod(b.id)]);
    }

    #[test]
    fn tampered_storage_is_integrity_error() {
        let fx = Fixture::new();
        let m = fx.compile("a", &[("f.txt", "A")]);
        fs::write(fx.engine.paths().stored_mod_dir(&m.id).join("f.txt"), "evil").unwrap();

        let result = fx.engine.deploy(&m);
        assert!(matches!(result, Err(EngineError::Integrity { .. })));
        assert!(!fx.live("f.txt").exists());
        assert!(fx.lineage("f.txt").is_none());
        assert!(fx.engine.list_deployed().unwrap().is_empty());
    }

    #[test]
    fn staging_and_journal_removed_after_success() {
        let fx = Fixture::new();
        let m = fx.compile("a", &[("f.txt", "A")]);
        let report = fx.engine.deploy(&m).unwrap();
        assert!(!fx.engine.paths().staging_dir(report.op_id.as_str()).exists());
        assert!(!fx.engine.paths().journal_path(report.op_id.as_str()).exists());
    }

    #[test]
    fn drifted_live_file_is_repaired_when_shadowed() {
        let fx = Fixture::new();
        let a = fx.compile("a", &[("f.txt", "A")]);
        let b = fx.compile("b", &[("f.txt", "B")]);
        let mut b_high = b.clone();
        b_high.load_order = 5;
        fx.engine.deploy(&b_high).unwrap();

        fs::write(fx.live("f.txt"), "edited by hand").unwrap();

        let mut a_low = a.clone();
        a_low.load_order = 1;
        let report = fx.engine.deploy(&a_low).unwrap();
        assert_eq!(report.repaired.len(), 1);
        assert_eq!(fs::read_to_string(fx.live("f.txt")).unwrap(), "B");
    }

    #[test]
    fn wrong_game_is_validation_error() {
        let fx = Fixture::new();
        let mut m = fx.compile("a", &[("f.txt", "A")]);
        m.game_id = "other".into();
        assert!(matches!(fx.engine.deploy(&m), Err(EngineError::Validation(_))));
    }
}
