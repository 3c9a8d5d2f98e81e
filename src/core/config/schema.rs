//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing: the manager directory must be
//! a single path component, the stale-lock threshold must be positive, and
//! every configured game must name both of its roots.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Top-level configuration file.
///
/// # Example
///
/// ```toml
/// manager_dir = ".modweave"
///
/// [lock]
/// stale_after_secs = 300
/// os_lock = true
///
/// [deploy]
/// keep_staging_on_failure = true
/// verify_after_merge = true
///
/// [games.skyrim]
/// install_root = "/games/skyrim"
/// storage_root = "/data/modweave/skyrim"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Name of the bookkeeping directory inside each install root.
    pub manager_dir: Option<String>,

    /// DirectoryLock settings
    pub lock: Option<LockSettings>,

    /// Deploy settings
    pub deploy: Option<DeploySettings>,

    /// Known game installs, keyed by game id
    pub games: BTreeMap<String, GameEntry>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.manager_dir {
            let single_component = !dir.is_empty()
                && !dir.contains('/')
                && !dir.contains('\\')
                && dir != "."
                && dir != "..";
            if !single_component {
                return Err(ConfigError::InvalidValue(format!(
                    "manager_dir must be a single directory name, got '{}'",
                    dir
                )));
            }
        }

        if let Some(lock) = &self.lock {
            lock.validate()?;
        }

        for (id, game) in &self.games {
            if id.trim().is_empty() {
                return Err(ConfigError::InvalidValue("game id cannot be empty".into()));
            }
            game.validate(id)?;
        }

        Ok(())
    }
}

/// DirectoryLock settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockSettings {
    /// Age after which a sentinel is considered abandoned
    pub stale_after_secs: Option<u64>,

    /// Also take an OS advisory lock (requires the `os-lock` feature)
    pub os_lock: Option<bool>,
}

impl LockSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_after_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "lock.stale_after_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Deploy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeploySettings {
    /// Keep the staging tree when a deploy fails
    pub keep_staging_on_failure: Option<bool>,

    /// Re-hash merged files against their lineage top
    pub verify_after_merge: Option<bool>,
}

/// One entry of the external game registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GameEntry {
    pub install_root: PathBuf,
    pub storage_root: PathBuf,
}

impl GameEntry {
    pub fn validate(&self, id: &str) -> Result<(), ConfigError> {
        if self.install_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "games.{}.install_root cannot be empty",
                id
            )));
        }
        if self.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "games.{}.storage_root cannot be empty",
                id
            )));
        }
        if self.storage_root.starts_with(&self.install_root) {
            return Err(ConfigError::InvalidValue(format!(
                "games.{}.storage_root must live outside the install root",
                id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConfigFile::default();
        assert!(config.manager_dir.is_none());
        assert!(config.games.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn manager_dir_must_be_single_component() {
        for bad in ["", "a/b", "..", "."] {
            let config = ConfigFile {
                manager_dir: Some(bad.to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn zero_stale_threshold_rejected() {
        let config = ConfigFile {
            lock: Some(LockSettings {
                stale_after_secs: Some(0),
                os_lock: None,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_inside_install_rejected() {
        let mut games = BTreeMap::new();
        games.insert(
            "g".to_string(),
            GameEntry {
                install_root: PathBuf::from("/games/g"),
                storage_root: PathBuf::from("/games/g/mods"),
            },
        );
        let config = ConfigFile {
            games,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_full_example() {
        let raw = r#"
            manager_dir = ".mw"

            [lock]
            stale_after_secs = 60

            [deploy]
            verify_after_merge = false

            [games.g]
            install_root = "/games/g"
            storage_root = "/data/g"
        "#;
        let config: ConfigFile = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.manager_dir.as_deref(), Some(".mw"));
        assert_eq!(config.games["g"].install_root, PathBuf::from("/games/g"));
    }
}
