//! engine::compile
//!
//! Turn a source directory into a stored mod.
//!
//! Compile hashes every file under the source directory, derives the mod id
//! from the game id, name and version, moves the directory into
//! `<storage>/mods/<modId>/` and writes the stored manifest. The file list
//! recorded here never changes afterwards.

use std::path::Path;

use crate::core::fsops;
use crate::core::hash;
use crate::core::manifest::{ManifestFile, ModManifest, ModMetadata};
use crate::core::types::{ModId, RelPath, UtcTimestamp};

use super::{DeploymentEngine, EngineError};

impl DeploymentEngine {
    /// Compile `source_dir` into a stored mod.
    ///
    /// The source directory is consumed: it is moved into mod storage.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] if the directory is missing or empty,
    ///   metadata lacks required fields, or a file would land inside the
    ///   engine's bookkeeping directory
    /// - [`EngineError::Conflict`] if a stored mod with the same id exists
    pub fn compile(
        &self,
        source_dir: &Path,
        metadata: ModMetadata,
    ) -> Result<ModManifest, EngineError> {
        let _lock = self.lock()?;
        self.compile_locked(source_dir, metadata)
    }

    pub(crate) fn compile_locked(
        &self,
        source_dir: &Path,
        metadata: ModMetadata,
    ) -> Result<ModManifest, EngineError> {
        let id = ModId::generate(&self.game().id, &metadata.name, &metadata.version);
        if self.paths().stored_manifest_path(&id).exists()
            || self.paths().stored_mod_dir(&id).exists()
        {
            return Err(EngineError::Conflict(format!(
                "a stored mod with id '{}' ({} {}) already exists",
                id, metadata.name, metadata.version
            )));
        }

        let manifest = self.build_manifest(source_dir, id, metadata)?;
        let stored_dir = self.paths().stored_mod_dir(&manifest.id);
        fsops::move_dir(source_dir, &stored_dir)?;

        if let Err(e) = manifest.write(&self.paths().stored_manifest_path(&manifest.id)) {
            // Undo the move.
            if let Err(undo) = fsops::move_dir(&stored_dir, source_dir) {
                tracing::error!(error = %undo, dir = %stored_dir.display(), "failed to return source after compile error");
            }
            return Err(e.into());
        }

        tracing::info!(
            mod_id = %manifest.id,
            name = %manifest.name,
            files = manifest.files.len(),
            "compiled mod"
        );
        Ok(manifest)
    }

    /// Hash every file under `source_dir` into a manifest. Nothing is moved.
    pub(crate) fn build_manifest(
        &self,
        source_dir: &Path,
        id: ModId,
        metadata: ModMetadata,
    ) -> Result<ModManifest, EngineError> {
        metadata.validate().map_err(EngineError::Validation)?;
        if !source_dir.is_dir() {
            return Err(EngineError::Validation(format!(
                "source directory '{}' does not exist",
                source_dir.display()
            )));
        }

        let mut files = Vec::new();
        for rel in fsops::list_files(source_dir)? {
            let rel_path = RelPath::from_path(&rel).map_err(|e| {
                EngineError::Validation(format!("unusable file path '{}': {}", rel.display(), e))
            })?;
            if self.paths().is_internal(&rel_path) {
                return Err(EngineError::Validation(format!(
                    "file '{}' would overwrite modweave's own records",
                    rel_path
                )));
            }
            let full = source_dir.join(&rel);
            let digest = hash::hash_file(&full).map_err(|e| EngineError::io(&full, e))?;
            files.push(ManifestFile {
                file_path: rel_path,
                hash: digest.hash,
                size: digest.size,
            });
        }
        if files.is_empty() {
            return Err(EngineError::Validation(format!(
                "source directory '{}' contains no files",
                source_dir.display()
            )));
        }

        Ok(ModManifest {
            id,
            game_id: self.game().id.clone(),
            version: metadata.version,
            load_order: 0,
            name: metadata.name,
            description: metadata.description,
            download_source: metadata.download_source,
            download_date: metadata.download_date.unwrap_or_else(UtcTimestamp::now),
            download_link: metadata.download_link,
            tags: metadata.tags,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::game::Game;
    use std::fs;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> DeploymentEngine {
        let game = Game::new("g", temp.path().join("install"), temp.path().join("storage"));
        fs::create_dir_all(&game.install_root).unwrap();
        DeploymentEngine::new(Config::default(), game)
    }

    fn source(temp: &TempDir, name: &str, files: &[(&str, &str)]) -> std::path::PathBuf {
        let dir = temp.path().join("src").join(name);
        for (rel, body) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        dir
    }

    #[test]
    fn compile_moves_source_into_storage() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let src = source(&temp, "m", &[("a.txt", "hello"), ("d/b.txt", "bye")]);

        let manifest = engine.compile(&src, ModMetadata::new("M", "1")).unwrap();

        assert!(!src.exists());
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.game_id, "g");
        assert_eq!(manifest.id, ModId::generate("g", "M", "1"));
        let stored = engine.paths().stored_mod_dir(&manifest.id);
        assert_eq!(fs::read_to_string(stored.join("d/b.txt")).unwrap(), "bye");
        assert!(engine.paths().stored_manifest_path(&manifest.id).exists());
        assert_eq!(manifest.files[0].size, 5);
    }

    #[test]
    fn missing_source_is_validation_error() {
        let temp = TempDir::new().unwrap();
        let result = engine(&temp).compile(&temp.path().join("nope"), ModMetadata::new("M", "1"));
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn missing_metadata_is_validation_error() {
        let temp = TempDir::new().unwrap();
        let src = source(&temp, "m", &[("a.txt", "x")]);
        let result = engine(&temp).compile(&src, ModMetadata::new("", "1"));
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(src.exists());
    }

    #[test]
    fn empty_source_is_validation_error() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("empty");
        fs::create_dir_all(&src).unwrap();
        let result = engine(&temp).compile(&src, ModMetadata::new("M", "1"));
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn internal_paths_rejected() {
        let temp = TempDir::new().unwrap();
        let src = source(&temp, "m", &[(".modweave/game_state.json", "{}")]);
        let result = engine(&temp).compile(&src, ModMetadata::new("M", "1"));
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn duplicate_id_is_conflict() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let first = source(&temp, "a", &[("a.txt", "1")]);
        let second = source(&temp, "b", &[("a.txt", "2")]);
        engine.compile(&first, ModMetadata::new("M", "1")).unwrap();
        let result = engine.compile(&second, ModMetadata::new("M", "1"));
        assert!(matches!(result, Err(EngineError::Conflict(_))));
        assert!(second.exists());
    }
}
