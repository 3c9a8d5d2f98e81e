//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file instead of the default
//! - `--game <id>`: Game install to operate on
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::core::manifest::{MetadataChanges, ModMetadata};
use crate::core::types::{LoadOrder, ModId};

/// Modweave - layered mod deployment with per-file ownership lineage
#[derive(Parser, Debug)]
#[command(name = "modweave")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $MODWEAVE_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Game id from the config's [games] table
    #[arg(long, global = true, value_name = "ID")]
    pub game: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hash a directory and move it into mod storage
    #[command(
        name = "compile",
        long_about = "Hash every file under SOURCE, write a manifest, and move the \
            directory into the game's mod storage.\n\n\
            The mod id is derived from the game id, name and version, so compiling \
            the same name and version twice is rejected.",
        after_help = "\
EXAMPLES:
    # Store a downloaded mod
    modweave compile ./BetterTextures --name \"Better Textures\" --mod-version 1.2

    # Store and deploy in one step
    modweave compile ./BetterTextures --name \"Better Textures\" --mod-version 1.2 --deploy"
    )]
    Compile {
        /// Directory holding the mod files, laid out like the install tree
        source: PathBuf,

        #[command(flatten)]
        metadata: MetadataArgs,

        /// Deploy the mod at the end of the load order after compiling
        #[arg(long)]
        deploy: bool,
    },

    /// Deploy a stored mod into the live tree
    Deploy {
        /// Mod id
        id: ModId,

        /// Load order slot (defaults to the end of the load order)
        #[arg(long, value_name = "N")]
        load_order: Option<LoadOrder>,
    },

    /// Remove a deployed mod from the live tree
    Disable {
        /// Mod id
        id: ModId,
    },

    /// Deploy a stored mod at the end of the load order if it is not deployed
    Enable {
        /// Mod id
        id: ModId,
    },

    /// Change a stored mod's metadata without re-hashing its files
    Edit {
        /// Mod id
        id: ModId,

        #[command(flatten)]
        changes: ChangeArgs,
    },

    /// Recompile a stored mod, optionally from a new source directory
    #[command(
        name = "update",
        after_help = "\
EXAMPLES:
    # Re-hash the stored files after editing them in place
    modweave update 3f2a9c01d4e5b6a7

    # Replace the mod with a new release
    modweave update 3f2a9c01d4e5b6a7 --from ./BetterTextures-1.3 --mod-version 1.3"
    )]
    Update {
        /// Mod id
        id: ModId,

        /// New source directory (consumed)
        #[arg(long, value_name = "DIR")]
        from: Option<PathBuf>,

        #[command(flatten)]
        changes: ChangeArgs,
    },

    /// Move a stored mod to trash
    Delete {
        /// Mod id
        id: ModId,
    },

    /// Reorder deployed mods; listed ids come first
    #[command(
        name = "reorder",
        long_about = "Recompute load orders so the listed mods come first, in the \
            given order. Deployed mods that are not listed keep their relative \
            order after them. Mods whose slot changed are redeployed.",
        after_help = "\
EXAMPLES:
    # Make b load before a (a then wins every shared path)
    modweave reorder b a"
    )]
    Reorder {
        /// Mod ids in the desired order
        #[arg(required = true)]
        ids: Vec<ModId>,
    },

    /// List stored mods
    List {
        /// Only deployed mods, in load order
        #[arg(long)]
        deployed: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show deployed mods and interrupted merges
    Status,

    /// Show paths claimed by more than one deployed mod
    Conflicts,

    /// Compare live files with their recorded owners
    Verify,

    /// Inspect, resume or discard interrupted merges
    #[command(
        name = "recover",
        after_help = "\
EXAMPLES:
    # See what was interrupted
    modweave recover --list

    # Finish the merge from its kept staging tree
    modweave recover --resume 6b1e0f8e-...

    # Give up on it (staging goes to trash; the live tree is untouched)
    modweave recover --discard 6b1e0f8e-..."
    )]
    Recover {
        /// List interrupted merges (default)
        #[arg(long, conflicts_with_all = ["resume", "discard"])]
        list: bool,

        /// Resume the merge with this op id
        #[arg(long, value_name = "OP_ID", conflicts_with = "discard")]
        resume: Option<String>,

        /// Discard the merge with this op id
        #[arg(long, value_name = "OP_ID")]
        discard: Option<String>,
    },
}

/// Metadata for a new mod.
#[derive(Args, Debug, Clone)]
pub struct MetadataArgs {
    /// Display name
    #[arg(long)]
    pub name: String,

    /// Mod version
    #[arg(long = "mod-version", value_name = "VERSION")]
    pub mod_version: String,

    /// Free-form description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Where the mod came from (site or author)
    #[arg(long = "source", value_name = "SOURCE", default_value = "")]
    pub download_source: String,

    /// Download URL
    #[arg(long = "link", value_name = "URL", default_value = "")]
    pub download_link: String,

    /// Tag (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

impl MetadataArgs {
    pub fn to_metadata(&self) -> ModMetadata {
        ModMetadata {
            name: self.name.clone(),
            version: self.mod_version.clone(),
            description: self.description.clone(),
            download_source: self.download_source.clone(),
            download_date: None,
            download_link: self.download_link.clone(),
            tags: self.tags.iter().cloned().collect(),
        }
    }
}

/// Optional metadata edits.
#[derive(Args, Debug, Clone, Default)]
pub struct ChangeArgs {
    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New mod version
    #[arg(long = "mod-version", value_name = "VERSION")]
    pub mod_version: Option<String>,

    /// New description
    #[arg(long)]
    pub description: Option<String>,

    /// New download source
    #[arg(long = "source", value_name = "SOURCE")]
    pub download_source: Option<String>,

    /// New download URL
    #[arg(long = "link", value_name = "URL")]
    pub download_link: Option<String>,

    /// Replace all tags (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Remove all tags
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,
}

impl ChangeArgs {
    pub fn to_changes(&self) -> MetadataChanges {
        let tags = if self.clear_tags {
            Some(BTreeSet::new())
        } else if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.iter().cloned().collect())
        };
        MetadataChanges {
            name: self.name.clone(),
            version: self.mod_version.clone(),
            description: self.description.clone(),
            download_source: self.download_source.clone(),
            download_date: None,
            download_link: self.download_link.clone(),
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["modweave", "list", "--game", "skyrim", "-q"]).unwrap();
        assert_eq!(cli.game.as_deref(), Some("skyrim"));
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::List { deployed: false, json: false }));
    }

    #[test]
    fn rejects_invalid_mod_id() {
        assert!(Cli::try_parse_from(["modweave", "deploy", "../etc"]).is_err());
    }

    #[test]
    fn change_args_map_to_metadata_changes() {
        let cli = Cli::try_parse_from([
            "modweave", "edit", "abc", "--name", "New", "--tag", "x", "--tag", "y",
        ])
        .unwrap();
        let Command::Edit { changes, .. } = cli.command else {
            panic!("expected edit");
        };
        let changes = changes.to_changes();
        assert_eq!(changes.name.as_deref(), Some("New"));
        assert_eq!(changes.tags.unwrap().len(), 2);
        assert!(changes.version.is_none());
    }

    #[test]
    fn recover_resume_and_discard_conflict() {
        assert!(Cli::try_parse_from([
            "modweave", "recover", "--resume", "a", "--discard", "b"
        ])
        .is_err());
    }
}
