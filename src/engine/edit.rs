//! engine::edit
//!
//! Metadata edits, updates and deletion of stored mods.
//!
//! - `edit_metadata` rewrites metadata only. The id and file list stay.
//! - `update` recompiles from a new source (or the stored files) and may
//!   produce a new id when name or version change.
//! - `delete_stored` moves a stored mod to trash. Deployed mods must be
//!   disabled first.

use std::path::{Path, PathBuf};

use crate::core::fsops;
use crate::core::manifest::{MetadataChanges, ModManifest, ModMetadata};
use crate::core::ops::journal::OpId;
use crate::core::registry::GameState;
use crate::core::types::{LoadOrder, ModId};

use super::{DeploymentEngine, EngineError, Trash};

impl DeploymentEngine {
    /// Rewrite a stored mod's metadata.
    ///
    /// A deployed mod is disabled first and redeployed at its load order.
    pub fn edit_metadata(
        &self,
        id: &ModId,
        changes: &MetadataChanges,
    ) -> Result<ModManifest, EngineError> {
        let _lock = self.lock()?;
        self.edit_metadata_locked(id, changes)
    }

    fn edit_metadata_locked(
        &self,
        id: &ModId,
        changes: &MetadataChanges,
    ) -> Result<ModManifest, EngineError> {
        let mut manifest = self.stored_manifest(id)?;
        if changes.is_empty() {
            return Ok(manifest);
        }
        changes
            .apply_to_manifest(&mut manifest)
            .map_err(EngineError::Validation)?;

        let deployed_at = GameState::load(self.paths())?.load_order_of(id);
        if deployed_at.is_some() {
            self.disable_locked(id)?;
        }
        manifest.write(&self.paths().stored_manifest_path(id))?;
        if let Some(load_order) = deployed_at {
            self.deploy_locked(&manifest, load_order)?;
        }

        tracing::info!(mod_id = %id, redeployed = deployed_at.is_some(), "edited mod metadata");
        Ok(manifest)
    }

    /// Recompile a stored mod.
    ///
    /// With `new_source` the mod's files are replaced by that directory's
    /// contents (the directory is consumed). Without it the stored files are
    /// re-hashed. If the mod was deployed it is redeployed at its previous
    /// load order.
    pub fn update(
        &self,
        id: &ModId,
        new_source: Option<&Path>,
        changes: &MetadataChanges,
    ) -> Result<ModManifest, EngineError> {
        let _lock = self.lock()?;
        self.update_locked(id, new_source, changes)
    }

    fn update_locked(
        &self,
        id: &ModId,
        new_source: Option<&Path>,
        changes: &MetadataChanges,
    ) -> Result<ModManifest, EngineError> {
        let old = self.stored_manifest(id)?;
        let mut metadata = old.metadata();
        changes.apply(&mut metadata);
        metadata.validate().map_err(EngineError::Validation)?;

        let new_id = ModId::generate(&self.game().id, &metadata.name, &metadata.version);
        let id_changed = &new_id != id;
        if id_changed && self.paths().stored_manifest_path(&new_id).exists() {
            return Err(EngineError::Conflict(format!(
                "updating '{}' would produce id '{}', which is already stored",
                id, new_id
            )));
        }

        // Without a new source, recompile from a scratch copy of the stored
        // files so the stored copy can be trashed like any other old version.
        let scratch = self.paths().staging_dir(OpId::new().as_str());
        let source: PathBuf = match new_source {
            Some(dir) => dir.to_path_buf(),
            None => {
                let copy = scratch.join("source");
                fsops::copy_tree(&self.paths().stored_mod_dir(id), &copy)?;
                copy
            }
        };

        let result = self.replace_stored(id, &new_id, &source, metadata);
        if let Err(e) = fsops::remove_tree(&scratch) {
            tracing::warn!(dir = %scratch.display(), error = %e, "failed to remove update scratch");
        }
        let (manifest, deployed_at) = result?;

        if let Some(load_order) = deployed_at {
            self.deploy_locked(&manifest, load_order)?;
        }
        tracing::info!(
            old_id = %id,
            new_id = %manifest.id,
            redeployed = deployed_at.is_some(),
            "updated mod"
        );
        Ok(manifest)
    }

    /// Hash the new source, retire the old stored copy and store the new one.
    ///
    /// Returns the new manifest and the load order to redeploy at.
    fn replace_stored(
        &self,
        old_id: &ModId,
        new_id: &ModId,
        source: &Path,
        metadata: ModMetadata,
    ) -> Result<(ModManifest, Option<LoadOrder>), EngineError> {
        let manifest = self.build_manifest(source, new_id.clone(), metadata)?;

        let deployed_at = GameState::load(self.paths())?.load_order_of(old_id);
        if deployed_at.is_some() {
            self.disable_locked(old_id)?;
        }

        let mut trash = Trash::new(self.paths());
        let paths = self.paths();
        if new_id != old_id {
            fsops::move_dir(source, &paths.stored_mod_dir(new_id))?;
            manifest.write(&paths.stored_manifest_path(new_id))?;
            self.trash_stored(old_id, &mut trash)?;
        } else {
            self.trash_stored(old_id, &mut trash)?;
            fsops::move_dir(source, &paths.stored_mod_dir(new_id))?;
            manifest.write(&paths.stored_manifest_path(new_id))?;
        }
        if let Some(dir) = trash.into_used() {
            tracing::debug!(mod_id = %old_id, trash = %dir.display(), "old stored copy trashed");
        }
        Ok((manifest, deployed_at))
    }

    /// Move a stored mod to trash.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Conflict`] if the mod is deployed
    /// - [`EngineError::NotFound`] if nothing is stored under `id`
    pub fn delete_stored(&self, id: &ModId) -> Result<PathBuf, EngineError> {
        let _lock = self.lock()?;

        if GameState::load(self.paths())?.contains(id) {
            return Err(EngineError::Conflict(format!(
                "mod '{}' is deployed; disable it before deleting",
                id
            )));
        }
        let paths = self.paths();
        if !paths.stored_manifest_path(id).exists() && !paths.stored_mod_dir(id).exists() {
            return Err(EngineError::NotFound(format!("stored mod '{}'", id)));
        }

        let mut trash = Trash::new(paths);
        self.trash_stored(id, &mut trash)?;
        tracing::info!(mod_id = %id, trash = %trash.path().display(), "deleted stored mod");
        Ok(trash.path().to_path_buf())
    }

    fn trash_stored(&self, id: &ModId, trash: &mut Trash) -> Result<(), EngineError> {
        let dir = self.paths().stored_mod_dir(id);
        if dir.exists() {
            trash.take_dir(&dir, format!("mods/{}", id))?;
        }
        let manifest = self.paths().stored_manifest_path(id);
        if manifest.exists() {
            trash.take(&manifest, format!("manifests/{}.json", id))?;
        }
        Ok(())
    }
}
