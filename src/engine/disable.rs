//! engine::disable
//!
//! Remove a deployed mod from the live tree.
//!
//! For every file the mod shipped, its lineage entry is dropped and the live
//! path is brought back in line with the new top of the lineage:
//!
//! - Nothing left: the live file and the lineage record move to trash
//! - Only GAME left: the live file is copied to trash and the original game
//!   bytes are moved back from the backup
//! - Other owners left: the live file is copied to trash, and if it does not
//!   match the new top, the top owner's stored content is restored
//!
//! Per-file errors are logged and collected; they never stop the pass.

use std::path::PathBuf;

use crate::core::fsops;
use crate::core::hash;
use crate::core::lineage::FileLineage;
use crate::core::manifest::ModManifest;
use crate::core::registry::GameState;
use crate::core::types::{ModId, OwnerId, RelPath};

use super::{DeploymentEngine, EngineError, Trash};

/// What happened to one path during disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// The mod was the last owner; the file is gone from the live tree.
    Removed,
    /// The live file now holds a different owner's content.
    Restored,
    /// The mod was shadowed; the live file is unchanged.
    Unchanged,
    /// The path had no record of this mod.
    Untracked,
}

/// Outcome of a disable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisableReport {
    pub removed: Vec<RelPath>,
    pub restored: Vec<RelPath>,
    pub unchanged: Vec<RelPath>,
    pub untracked: Vec<RelPath>,
    /// Paths that failed, with the error message.
    pub failures: Vec<(RelPath, String)>,
    /// Trash folder holding everything removed, if anything was.
    pub trash: Option<PathBuf>,
}

impl DisableReport {
    fn record(&mut self, rel: RelPath, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Removed => self.removed.push(rel),
            FileOutcome::Restored => self.restored.push(rel),
            FileOutcome::Unchanged => self.unchanged.push(rel),
            FileOutcome::Untracked => self.untracked.push(rel),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl DeploymentEngine {
    /// Disable a deployed mod, returning it to the Stored state.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the mod is not deployed
    /// - Errors moving the manifest or saving the Registry. Per-file errors
    ///   are reported in [`DisableReport::failures`] instead.
    pub fn disable(&self, id: &ModId) -> Result<DisableReport, EngineError> {
        let _lock = self.lock()?;
        self.disable_locked(id)
    }

    pub(crate) fn disable_locked(&self, id: &ModId) -> Result<DisableReport, EngineError> {
        let mut state = GameState::load(self.paths())?;
        if !state.contains(id) {
            return Err(EngineError::NotFound(format!("deployed mod '{}'", id)));
        }

        let manifest_path = self.paths().manifest_path(id);
        let manifest = match ModManifest::read(&manifest_path)? {
            Some(m) => m,
            None => {
                tracing::warn!(mod_id = %id, "deployed manifest missing; using stored manifest");
                self.stored_manifest(id)?
            }
        };

        let owner = OwnerId::Mod(id.clone());
        let mut trash = Trash::new(self.paths());
        let mut report = DisableReport::default();

        for file in &manifest.files {
            let rel = &file.file_path;
            match self.disable_file(&owner, rel, &mut trash) {
                Ok(outcome) => report.record(rel.clone(), outcome),
                Err(e) => {
                    tracing::error!(mod_id = %id, path = %rel, error = %e, "failed to disable file");
                    report.failures.push((rel.clone(), e.to_string()));
                }
            }
        }

        if manifest_path.exists() {
            trash.take(&manifest_path, format!("manifests/{}.json", id))?;
        }
        state.remove(id);
        state.save(self.paths())?;

        report.trash = trash.into_used();
        tracing::info!(
            mod_id = %id,
            removed = report.removed.len(),
            restored = report.restored.len(),
            failures = report.failures.len(),
            "disabled mod"
        );
        Ok(report)
    }

    fn disable_file(
        &self,
        owner: &OwnerId,
        rel: &RelPath,
        trash: &mut Trash,
    ) -> Result<FileOutcome, EngineError> {
        let Some(mut lineage) = FileLineage::load(self.paths(), rel)? else {
            tracing::warn!(path = %rel, owner = %owner, "no lineage recorded; leaving live file alone");
            return Ok(FileOutcome::Untracked);
        };
        if !lineage.contains(owner) {
            return Ok(FileOutcome::Untracked);
        }

        lineage.remove_all_of(owner);
        let live = self.paths().live_path(rel);
        let trashed_name = PathBuf::from("files").join(rel.as_str());

        if lineage.is_empty() {
            if live.exists() {
                trash.take(&live, &trashed_name)?;
                if let Some(parent) = live.parent() {
                    fsops::prune_empty_dirs(parent, self.paths().install_root());
                }
            }
            let record = self.paths().lineage_path(rel);
            trash.take(&record, format!("lineages/{}.json", rel))?;
            if let Some(parent) = record.parent() {
                fsops::prune_empty_dirs(parent, &self.paths().lineages_dir());
            }
            return Ok(FileOutcome::Removed);
        }

        if live.exists() {
            trash.keep(&live, &trashed_name)?;
        }

        if lineage.is_game_only() {
            let backup = self.paths().backup_path(rel);
            if !backup.exists() {
                lineage.save(self.paths(), rel)?;
                return Err(EngineError::NotFound(format!(
                    "backup of game file '{}'; lineage kept as [GAME]",
                    rel
                )));
            }
            fsops::move_file(&backup, &live)?;
            if let Some(parent) = backup.parent() {
                fsops::prune_empty_dirs(parent, &self.paths().backups_dir());
            }
            FileLineage::delete(self.paths(), rel)?;
            return Ok(FileOutcome::Restored);
        }

        let outcome = self.restore_top(&lineage, rel)?;
        lineage.save(self.paths(), rel)?;
        Ok(outcome)
    }

    /// Make the live file match the lineage top, copying from its owner's
    /// stored content when it does not.
    fn restore_top(&self, lineage: &FileLineage, rel: &RelPath) -> Result<FileOutcome, EngineError> {
        let Some(top) = lineage.peek() else {
            return Ok(FileOutcome::Unchanged);
        };
        let live = self.paths().live_path(rel);
        let current = hash::probe(&live).map_err(|e| EngineError::io(&live, e))?;
        if current.digest().map(|d| &d.hash) == Some(&top.hash) {
            return Ok(FileOutcome::Unchanged);
        }

        let source = self.content_source(&top.owner, rel);
        let available = hash::probe(&source).map_err(|e| EngineError::io(&source, e))?;
        match available.digest() {
            Some(d) if d.hash == top.hash => {}
            Some(d) => {
                return Err(EngineError::Integrity {
                    path: rel.clone(),
                    expected: top.hash.to_string(),
                    actual: d.hash.to_string(),
                })
            }
            None => {
                return Err(EngineError::Integrity {
                    path: rel.clone(),
                    expected: top.hash.to_string(),
                    actual: format!("no stored copy for {}", top.owner),
                })
            }
        }

        fsops::copy_file(&source, &live)?;
        tracing::debug!(path = %rel, owner = %top.owner, "restored new top owner's content");
        Ok(FileOutcome::Restored)
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

    fn setup() -> (TempDir, DeploymentEngine) {
        let temp = TempDir::new().unwrap();
        let game = Game::new("g", temp.path().join("install"), temp.path().join("storage"));
        fs::create_dir_all(&game.install_root).unwrap();
        (temp, DeploymentEngine::new(Config::default(), game))
    }

    fn compile(temp: &TempDir, engine: &DeploymentEngine, name: &str, files: &[(&str, &str)]) -> ModManifest {
        let dir = temp.path().join("src").join(name);
        for (rel, body) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        engine.compile(&dir, ModMetadata::new(name, "1")).unwrap()
    }

    #[test]
    fn sole_owner_file_moves_to_trash() {
        let (temp, engine) = setup();
        let m = compile(&temp, &engine, "a", &[("deep/dir/f.txt", "A")]);
        engine.deploy(&m).unwrap();

        let report = engine.disable(&m.id).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 1);
        let install = &engine.game().install_root;
        assert!(!install.join("deep/dir/f.txt").exists());
        assert!(!install.join("deep").exists());
        let trash = report.trash.unwrap();
        assert_eq!(fs::read_to_string(trash.join("files/deep/dir/f.txt")).unwrap(), "A");
        assert!(trash.join("lineages/deep/dir/f.txt.json").exists());
        assert!(engine.lineage_of(&RelPath::new("deep/dir/f.txt").unwrap()).unwrap().is_none());
        assert!(engine.list_deployed().unwrap().is_empty());
        assert!(!engine.paths().game_state_path().exists());
    }

    #[test]
    fn game_only_lineage_restores_backup() {
        let (temp, engine) = setup();
        let live = engine.game().install_root.join("x.dat");
        fs::write(&live, "vanilla").unwrap();
        let m = compile(&temp, &engine, "a", &[("x.dat", "A")]);
        engine.deploy(&m).unwrap();

        let report = engine.disable(&m.id).unwrap();

        assert_eq!(report.restored.len(), 1);
        assert_eq!(fs::read_to_string(&live).unwrap(), "vanilla");
        let rel = RelPath::new("x.dat").unwrap();
        assert!(!engine.paths().backup_path(&rel).exists());
        assert!(engine.lineage_of(&rel).unwrap().is_none());
    }

    #[test]
    fn missing_backup_is_reported_not_fatal() {
        let (temp, engine) = setup();
        let install = engine.game().install_root.clone();
        fs::write(install.join("x.dat"), "vanilla").unwrap();
        let m = compile(&temp, &engine, "a", &[("x.dat", "A"), ("y.dat", "Y")]);
        engine.deploy(&m).unwrap();
        fs::remove_file(engine.paths().backup_path(&RelPath::new("x.dat").unwrap())).unwrap();

        let report = engine.disable(&m.id).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.removed, vec![RelPath::new("y.dat").unwrap()]);
        let lineage = engine.lineage_of(&RelPath::new("x.dat").unwrap()).unwrap().unwrap();
        assert!(lineage.is_game_only());
        assert!(engine.list_deployed().unwrap().is_empty());
    }

    #[test]
    fn not_deployed_is_not_found() {
        let (temp, engine) = setup();
        let m = compile(&temp, &engine, "a", &[("f", "A")]);
        assert!(matches!(engine.disable(&m.id), Err(EngineError::NotFound(_))));
    }
}
