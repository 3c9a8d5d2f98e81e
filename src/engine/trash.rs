//! engine::trash
//!
//! Timestamped holding areas for removed files.
//!
//! # Storage
//!
//! Each operation that removes anything gets its own folder, created on
//! first use:
//!
//! - `<storage>/trash/<YYYYMMDD-HHMMSS>-<uuid8>/files/<relPath>` - live files
//! - `.../lineages/<relPath>.json` - retired lineage records
//! - `.../manifests/<modId>.json` - retired manifests
//! - `.../mods/<modId>/` - retired stored mods
//! - `.../staging/<opId>/` - discarded staging trees
//!
//! Nothing here is ever read back by the engine. It exists for manual
//! recovery.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::core::fsops::{self, FsError};
use crate::core::paths::GamePaths;
use crate::core::types::UtcTimestamp;

/// One trash folder, created lazily.
#[derive(Debug)]
pub struct Trash {
    root: PathBuf,
    used: bool,
}

impl Trash {
    pub fn new(paths: &GamePaths) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", UtcTimestamp::now().compact(), &uuid[..8]);
        Self {
            root: paths.trash_dir().join(name),
            used: false,
        }
    }

    /// Folder path, whether or not it exists yet.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Whether anything has been placed in this folder.
    pub fn is_used(&self) -> bool {
        self.used
    }

    /// The folder if it was used.
    pub fn into_used(self) -> Option<PathBuf> {
        self.used.then_some(self.root)
    }

    /// Move a file into the trash under `name`.
    pub fn take(&mut self, from: &Path, name: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        let to = self.root.join(name);
        fsops::move_file(from, &to)?;
        self.used = true;
        tracing::debug!(from = %from.display(), to = %to.display(), "moved to trash");
        Ok(to)
    }

    /// Copy a file into the trash under `name`, leaving the original.
    pub fn keep(&mut self, from: &Path, name: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        let to = self.root.join(name);
        fsops::copy_file(from, &to)?;
        self.used = true;
        Ok(to)
    }

    /// Move a whole directory into the trash under `name`.
    pub fn take_dir(&mut self, from: &Path, name: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        let to = self.root.join(name);
        fsops::move_dir(from, &to)?;
        self.used = true;
        tracing::debug!(from = %from.display(), to = %to.display(), "moved directory to trash");
        Ok(to)
    }
}
