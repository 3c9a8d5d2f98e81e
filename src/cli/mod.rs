//! cli
//!
//! Command-line interface layer for Modweave.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and resolve the target game
//! - Install the tracing subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`] for execution. It never touches an install tree itself.
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Other failure |
//! | 2 | Validation or configuration error |
//! | 3 | Install is locked |
//! | 4 | Integrity check failed |
//! | 5 | I/O error |
//! | 6 | Conflict |
//! | 7 | Not found |
//! | 8 | Stored record unreadable |

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, ConfigError};
use crate::engine::{DeploymentEngine, EngineError};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "MODWEAVE_LOG";

/// Everything a command handler needs.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    /// Game id from `--game`.
    pub game: Option<String>,
    pub quiet: bool,
}

impl Context {
    /// Build the engine for the selected game.
    ///
    /// Without `--game` the config must name exactly one game.
    pub fn engine(&self) -> Result<DeploymentEngine> {
        let id = match &self.game {
            Some(id) => id.clone(),
            None => {
                let ids: Vec<&str> = self.config.game_ids().collect();
                match ids.as_slice() {
                    [only] => only.to_string(),
                    [] => bail!("no games configured; add a [games.<id>] table to the config"),
                    _ => bail!("several games configured ({}); pass --game", ids.join(", ")),
                }
            }
        };
        let game = self.config.game(&id)?;
        Ok(DeploymentEngine::new(self.config.clone(), game))
    }

    /// Print a line unless `--quiet` was given.
    pub fn say(&self, line: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", line.as_ref());
        }
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug, cli.quiet);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = config.loaded_from() {
        tracing::debug!(path = %path.display(), "loaded config");
    }

    let ctx = Context {
        config,
        game: cli.game.clone(),
        quiet: cli.quiet,
    };
    commands::dispatch(cli.command, &ctx)
}

/// Install the stderr fmt subscriber.
///
/// `--debug` forces `debug`; otherwise `$MODWEAVE_LOG` applies, defaulting
/// to `info` (`warn` with `--quiet`).
fn init_logging(debug: bool, quiet: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(if quiet { "warn" } else { "info" }))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Map an error to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<EngineError>() {
            return match e.kind() {
                "validation" => 2,
                "lock" => 3,
                "integrity" => 4,
                "io" => 5,
                "conflict" => 6,
                "not_found" => 7,
                "store" => 8,
                _ => 1,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::schema::{ConfigFile, GameEntry};
    use std::path::PathBuf;

    fn ctx(games: &[&str], game: Option<&str>) -> Context {
        let mut file = ConfigFile::default();
        for id in games {
            file.games.insert(
                id.to_string(),
                GameEntry {
                    install_root: PathBuf::from(format!("/games/{}", id)),
                    storage_root: PathBuf::from(format!("/data/{}", id)),
                },
            );
        }
        Context {
            config: Config::from_file(file).unwrap(),
            game: game.map(String::from),
            quiet: true,
        }
    }

    #[test]
    fn single_game_is_implicit() {
        let engine = ctx(&["skyrim"], None).engine().unwrap();
        assert_eq!(engine.game().id, "skyrim");
    }

    #[test]
    fn several_games_need_flag() {
        assert!(ctx(&["a", "b"], None).engine().is_err());
        assert_eq!(ctx(&["a", "b"], Some("b")).engine().unwrap().game().id, "b");
    }

    #[test]
    fn unknown_game_is_config_error() {
        let err = ctx(&["a"], Some("zzz")).engine().unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn engine_errors_map_to_codes() {
        let err = anyhow::Error::new(EngineError::NotFound("x".into())).context("deploy failed");
        assert_eq!(exit_code(&err), 7);
        assert_eq!(exit_code(&anyhow::anyhow!("plain")), 1);
    }
}
