//! core::paths
//!
//! Centralized path routing for everything the engine persists.
//!
//! # Architecture
//!
//! All locations are computed here so no other module joins directory
//! names by hand. Two roots are involved:
//!
//! - the **install root** (the live game tree), which carries the
//!   `<manager>` directory with per-install records, and
//! - the **storage root**, which holds stored mods and the scratch areas.
//!
//! # Install Layout
//!
//! - `<manager>/manifests/<modId>.json` - manifests of deployed mods
//! - `<manager>/lineages/<relPath>.json` - one lineage per managed path
//! - `<manager>/backups/<relPath>.backup` - original game bytes
//! - `<manager>/game_state.json` - the Registry
//! - `.lock` - DirectoryLock sentinel
//!
//! # Storage Layout
//!
//! - `mods/<modId>/` - stored mod files
//! - `manifests/<modId>.json` - stored manifests
//! - `trash/<stamp>/` - retained removals
//! - `staging/<opId>/` - deploy staging trees
//! - `journals/<opId>.json` - merge journals
//!
//! # Example
//!
//! ```
//! use modweave::core::paths::GamePaths;
//! use modweave::core::types::RelPath;
//! use std::path::PathBuf;
//!
//! let paths = GamePaths::new("/games/g", "/data/g", ".modweave");
//! let rel = RelPath::new("textures/x.png").unwrap();
//!
//! assert_eq!(
//!     paths.lineage_path(&rel),
//!     PathBuf::from("/games/g/.modweave/lineages/textures/x.png.json")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::core::game::Game;
use crate::core::types::{ModId, RelPath};

/// Name of the lock sentinel placed inside a locked directory.
pub const LOCK_FILE_NAME: &str = ".lock";

/// Path routing for one game install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePaths {
    install_root: PathBuf,
    storage_root: PathBuf,
    manager_dir_name: String,
}

impl GamePaths {
    pub fn new(
        install_root: impl Into<PathBuf>,
        storage_root: impl Into<PathBuf>,
        manager_dir_name: impl Into<String>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            storage_root: storage_root.into(),
            manager_dir_name: manager_dir_name.into(),
        }
    }

    pub fn for_game(game: &Game, manager_dir_name: &str) -> Self {
        Self::new(&game.install_root, &game.storage_root, manager_dir_name)
    }

    /// Same layout, rooted at a different install-like tree.
    ///
    /// Staging trees mirror the install root, so deploy computes every
    /// staged location through a rebased `GamePaths`.
    pub fn with_install_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: root.into(),
            storage_root: self.storage_root.clone(),
            manager_dir_name: self.manager_dir_name.clone(),
        }
    }

    // =========================================================================
    // Install-scoped paths
    // =========================================================================

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn manager_dir_name(&self) -> &str {
        &self.manager_dir_name
    }

    /// The live location of a managed path.
    pub fn live_path(&self, rel: &RelPath) -> PathBuf {
        rel.under(&self.install_root)
    }

    pub fn manager_dir(&self) -> PathBuf {
        self.install_root.join(&self.manager_dir_name)
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.manager_dir().join("manifests")
    }

    /// Manifest of a deployed mod: `<manager>/manifests/<modId>.json`.
    pub fn manifest_path(&self, id: &ModId) -> PathBuf {
        self.manifests_dir().join(format!("{}.json", id))
    }

    pub fn lineages_dir(&self) -> PathBuf {
        self.manager_dir().join("lineages")
    }

    /// Lineage record: `<manager>/lineages/<relPath>.json`.
    pub fn lineage_path(&self, rel: &RelPath) -> PathBuf {
        rel.under_with_suffix(&self.lineages_dir(), ".json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.manager_dir().join("backups")
    }

    /// Original game bytes: `<manager>/backups/<relPath>.backup`.
    pub fn backup_path(&self, rel: &RelPath) -> PathBuf {
        rel.under_with_suffix(&self.backups_dir(), ".backup")
    }

    /// The Registry document: `<manager>/game_state.json`.
    pub fn game_state_path(&self) -> PathBuf {
        self.manager_dir().join("game_state.json")
    }

    /// The lock sentinel for the install root.
    pub fn lock_path(&self) -> PathBuf {
        self.install_root.join(LOCK_FILE_NAME)
    }

    /// Whether a path inside the install root belongs to the engine's own
    /// bookkeeping rather than to game content.
    pub fn is_internal(&self, rel: &RelPath) -> bool {
        let first = rel.as_str().split('/').next().unwrap_or_default();
        first == self.manager_dir_name || first == LOCK_FILE_NAME
    }

    /// Whether a path inside the install root is a game backup.
    pub fn is_backup(&self, rel: &RelPath) -> bool {
        let mut parts = rel.as_str().split('/');
        parts.next() == Some(self.manager_dir_name.as_str()) && parts.next() == Some("backups")
    }

    // =========================================================================
    // Storage-scoped paths
    // =========================================================================

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn stored_mods_dir(&self) -> PathBuf {
        self.storage_root.join("mods")
    }

    /// Stored files of a compiled mod: `mods/<modId>/`.
    pub fn stored_mod_dir(&self, id: &ModId) -> PathBuf {
        self.stored_mods_dir().join(id.as_str())
    }

    pub fn stored_manifests_dir(&self) -> PathBuf {
        self.storage_root.join("manifests")
    }

    /// Stored manifest: `manifests/<modId>.json`.
    pub fn stored_manifest_path(&self, id: &ModId) -> PathBuf {
        self.stored_manifests_dir().join(format!("{}.json", id))
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.storage_root.join("trash")
    }

    pub fn staging_root(&self) -> PathBuf {
        self.storage_root.join("staging")
    }

    /// Staging tree for one operation: `staging/<opId>/`.
    pub fn staging_dir(&self, op_id: &str) -> PathBuf {
        self.staging_root().join(op_id)
    }

    pub fn journals_dir(&self) -> PathBuf {
        self.storage_root.join("journals")
    }

    /// Merge journal for one operation: `journals/<opId>.json`.
    pub fn journal_path(&self, op_id: &str) -> PathBuf {
        self.journals_dir().join(format!("{}.json", op_id))
    }
}
