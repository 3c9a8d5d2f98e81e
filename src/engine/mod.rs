//! engine
//!
//! The DeploymentEngine: compile, deploy, disable, edit, update, delete and
//! reconcile mods for one game install.
//!
//! # Architecture
//!
//! Every mutating operation follows the same shape:
//!
//! ```text
//! acquire DirectoryLock -> validate -> stage -> journal -> merge -> Registry
//! ```
//!
//! Public methods take the install's [`DirectoryLock`] once and delegate to
//! `*_locked` internals, so composite operations (edit, update, reconcile)
//! run their parts under a single acquisition. Listing methods never lock
//! and may observe a slightly stale view during a concurrent deploy.
//!
//! # Mod lifecycle
//!
//! ```text
//! Stored --deploy--> Deployed --disable--> Stored --delete--> (trash)
//! ```
//!
//! # Invariants
//!
//! - After any completed operation the top of every lineage matches the
//!   live file at that path by hash
//! - A GAME entry is always the bottom of its lineage
//! - Deploy never writes into the live tree outside the journaled merge
//! - The Registry is updated last
//!
//! # Example
//!
//! ```no_run
//! use modweave::core::config::Config;
//! use modweave::core::game::Game;
//! use modweave::core::manifest::ModMetadata;
//! use modweave::engine::DeploymentEngine;
//! use std::path::Path;
//!
//! let config = Config::load(None)?;
//! let game = Game::new("skyrim", "/games/skyrim", "/data/modweave/skyrim");
//! let engine = DeploymentEngine::new(config, game);
//!
//! let manifest = engine.compile(Path::new("/downloads/better-textures"), ModMetadata::new("Better Textures", "1.0"))?;
//! engine.deploy(&manifest)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compile;
pub mod deploy;
pub mod disable;
pub mod edit;
#[cfg(any(test, feature = "fault_injection"))]
pub mod engine_hooks;
pub mod reconcile;
pub mod recovery;
pub mod trash;
pub mod verify;

pub use deploy::DeployReport;
pub use disable::DisableReport;
pub use reconcile::ReconcileReport;
pub use trash::Trash;
pub use verify::{ConflictEntry, DriftEntry, DriftReport};

use std::path::PathBuf;

use thiserror::Error;

use crate::core::config::Config;
use crate::core::fsops::FsError;
use crate::core::game::Game;
use crate::core::lineage::FileLineage;
use crate::core::manifest::ModManifest;
use crate::core::ops::journal::JournalError;
use crate::core::ops::lock::{DirectoryLock, LockError, LockOptions};
use crate::core::paths::GamePaths;
use crate::core::registry::{DeployedModRecord, GameState};
use crate::core::store::StoreError;
use crate::core::types::{ModId, OwnerId, RelPath};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing input, rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The install is locked by someone else. No side effects occurred.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A file's content does not match its recorded hash or size.
    #[error("integrity check failed for '{path}': expected {expected}, found {actual}")]
    Integrity {
        path: RelPath,
        expected: String,
        actual: String,
    },

    /// Reading or hashing a file failed.
    #[error("i/o error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown mod, journal or record.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly kind, used by the CLI for exit codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Lock(_) => "lock",
            Self::Integrity { .. } => "integrity",
            Self::Io { .. } | Self::Fs(_) => "io",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Store(_) | Self::Journal(_) => "store",
        }
    }
}

/// Deploys and removes mods for one game install.
///
/// Construct once per game with explicit configuration; the engine keeps no
/// global state.
#[derive(Debug, Clone)]
pub struct DeploymentEngine {
    config: Config,
    game: Game,
    paths: GamePaths,
    lock_options: LockOptions,
}

impl DeploymentEngine {
    pub fn new(config: Config, game: Game) -> Self {
        let paths = GamePaths::for_game(&game, config.manager_dir());
        let lock_options = LockOptions::from_config(&config);
        Self {
            config,
            game,
            paths,
            lock_options,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn paths(&self) -> &GamePaths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Acquire the install's DirectoryLock.
    pub(crate) fn lock(&self) -> Result<DirectoryLock, EngineError> {
        Ok(DirectoryLock::acquire(
            self.paths.install_root(),
            &self.lock_options,
        )?)
    }

    /// Read a stored manifest or fail with `NotFound`.
    pub(crate) fn stored_manifest(&self, id: &ModId) -> Result<ModManifest, EngineError> {
        ModManifest::read(&self.paths.stored_manifest_path(id))?
            .ok_or_else(|| EngineError::NotFound(format!("stored mod '{}'", id)))
    }

    /// Where the expected content of `owner` for `rel` is kept.
    pub(crate) fn content_source(&self, owner: &OwnerId, rel: &RelPath) -> PathBuf {
        match owner {
            OwnerId::Game => self.paths.backup_path(rel),
            OwnerId::Mod(id) => rel.under(&self.paths.stored_mod_dir(id)),
        }
    }

    // =========================================================================
    // Listing (lock-free)
    // =========================================================================

    /// Every stored manifest, sorted by name.
    ///
    /// Unreadable manifests are logged and skipped.
    pub fn list_stored(&self) -> Result<Vec<ModManifest>, EngineError> {
        let dir = self.paths.stored_manifests_dir();
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(dir, e)),
        };

        let mut manifests = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match ModManifest::read(&path) {
                Ok(Some(manifest)) => manifests.push(manifest),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable manifest"),
            }
        }
        manifests.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(manifests)
    }

    /// Registry records in load order.
    pub fn list_deployed(&self) -> Result<Vec<DeployedModRecord>, EngineError> {
        Ok(GameState::load(&self.paths)?.records().to_vec())
    }

    /// The persisted lineage for a managed path, if any.
    pub fn lineage_of(&self, rel: &RelPath) -> Result<Option<FileLineage>, EngineError> {
        Ok(FileLineage::load(&self.paths, rel)?)
    }
}
