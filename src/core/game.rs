//! core::game
//!
//! The externally resolved game reference.
//!
//! The engine never discovers games on its own. A caller (the CLI reads
//! them from the `[games]` table of the config) hands it a [`Game`] naming
//! the live install tree and the storage root that holds stored mods,
//! trash, staging and journals.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A game install the engine manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Stable game identifier, recorded in every manifest.
    pub id: String,
    /// Root of the live install tree that mods are deployed into.
    pub install_root: PathBuf,
    /// Root of the mod storage for this game.
    pub storage_root: PathBuf,
}

impl Game {
    pub fn new(
        id: impl Into<String>,
        install_root: impl Into<PathBuf>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            install_root: install_root.into(),
            storage_root: storage_root.into(),
        }
    }
}
