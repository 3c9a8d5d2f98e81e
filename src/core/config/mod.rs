//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Configuration is loaded once at process start and handed to the
//! `DeploymentEngine` explicitly. Nothing reads it through a global.
//!
//! # Locations
//!
//! Searched in order:
//! 1. An explicit path (`--config`)
//! 2. `$MODWEAVE_CONFIG` if set
//! 3. `<config dir>/modweave/config.toml`
//!
//! A missing file is not an error: defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use modweave::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("manager dir: {}", config.manager_dir());
//! println!("stale after: {:?}", config.stale_after());
//! ```

pub mod schema;

pub use schema::{ConfigFile, DeploySettings, GameEntry, LockSettings};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::game::Game;

/// Default name of the bookkeeping directory inside an install root.
pub const DEFAULT_MANAGER_DIR: &str = ".modweave";

/// Default age after which a lock sentinel is abandoned.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 300;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("unknown game '{0}'; add a [games.{0}] table to the config")]
    UnknownGame(String),
}

/// Loaded configuration with defaults applied through accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
    /// Path the configuration was loaded from, if any
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated. An explicit path that does not exist is an error too.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Ok(path) = std::env::var("MODWEAVE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate one config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;
        Ok(Self {
            file,
            loaded_from: Some(path.to_path_buf()),
        })
    }

    /// Build a config from an already parsed file.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(Self {
            file,
            loaded_from: None,
        })
    }

    /// `<config dir>/modweave/config.toml`, if a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("modweave").join("config.toml"))
    }

    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Name of the bookkeeping directory. Defaults to `.modweave`.
    pub fn manager_dir(&self) -> &str {
        self.file.manager_dir.as_deref().unwrap_or(DEFAULT_MANAGER_DIR)
    }

    /// Age after which a lock sentinel is abandoned. Defaults to 5 minutes.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(
            self.file
                .lock
                .as_ref()
                .and_then(|l| l.stale_after_secs)
                .unwrap_or(DEFAULT_STALE_AFTER_SECS),
        )
    }

    /// Whether to take the OS advisory lock. Defaults to `true`.
    pub fn os_lock(&self) -> bool {
        self.file
            .lock
            .as_ref()
            .and_then(|l| l.os_lock)
            .unwrap_or(true)
    }

    /// Whether failed deploys keep their staging tree. Defaults to `true`.
    pub fn keep_staging_on_failure(&self) -> bool {
        self.file
            .deploy
            .as_ref()
            .and_then(|d| d.keep_staging_on_failure)
            .unwrap_or(true)
    }

    /// Whether merged files are re-hashed. Defaults to `true`.
    pub fn verify_after_merge(&self) -> bool {
        self.file
            .deploy
            .as_ref()
            .and_then(|d| d.verify_after_merge)
            .unwrap_or(true)
    }

    /// Resolve a game from the `[games]` table.
    pub fn game(&self, id: &str) -> Result<Game, ConfigError> {
        let entry = self
            .file
            .games
            .get(id)
            .ok_or_else(|| ConfigError::UnknownGame(id.to_string()))?;
        Ok(Game::new(id, &entry.install_root, &entry.storage_root))
    }

    /// Ids of every configured game.
    pub fn game_ids(&self) -> impl Iterator<Item = &str> {
        self.file.games.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply() {
        let config = Config::default();
        assert_eq!(config.manager_dir(), ".modweave");
        assert_eq!(config.stale_after(), Duration::from_secs(300));
        assert!(config.os_lock());
        assert!(config.keep_staging_on_failure());
        assert!(config.verify_after_merge());
        assert!(config.loaded_from().is_none());
    }

    #[test]
    fn load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            manager_dir = ".mods"

            [lock]
            stale_after_secs = 10
            os_lock = false

            [games.demo]
            install_root = "/games/demo"
            storage_root = "/data/demo"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.manager_dir(), ".mods");
        assert_eq!(config.stale_after(), Duration::from_secs(10));
        assert!(!config.os_lock());
        assert_eq!(config.loaded_from(), Some(path.as_path()));

        let game = config.game("demo").unwrap();
        assert_eq!(game.install_root, PathBuf::from("/games/demo"));
        assert!(matches!(
            config.game("other"),
            Err(ConfigError::UnknownGame(_))
        ));
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(Some(&temp.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "surprise = true\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "manager_dir = \"a/b\"\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
