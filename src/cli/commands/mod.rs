//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Builds the engine for the selected game
//! 2. Calls the engine to execute the command
//! 3. Formats and displays output
//!
//! Handlers do NOT touch the install tree directly.

mod compile;
mod deploy;
mod edit;
mod inspect;
mod recover;

pub use compile::compile;
pub use deploy::{deploy, disable, enable, reorder};
pub use edit::{delete, edit, update};
pub use inspect::{conflicts, list, status, verify};
pub use recover::recover;

use crate::cli::args::Command;
use crate::cli::Context;
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Compile {
            source,
            metadata,
            deploy,
        } => compile::compile(ctx, &source, &metadata.to_metadata(), deploy),
        Command::Deploy { id, load_order } => deploy::deploy(ctx, &id, load_order),
        Command::Disable { id } => deploy::disable(ctx, &id),
        Command::Enable { id } => deploy::enable(ctx, &id),
        Command::Edit { id, changes } => edit::edit(ctx, &id, &changes.to_changes()),
        Command::Update { id, from, changes } => {
            edit::update(ctx, &id, from.as_deref(), &changes.to_changes())
        }
        Command::Delete { id } => edit::delete(ctx, &id),
        Command::Reorder { ids } => deploy::reorder(ctx, &ids),
        Command::List { deployed, json } => inspect::list(ctx, deployed, json),
        Command::Status => inspect::status(ctx),
        Command::Conflicts => inspect::conflicts(ctx),
        Command::Verify => inspect::verify(ctx),
        Command::Recover {
            list: _,
            resume,
            discard,
        } => recover::recover(ctx, resume.as_deref(), discard.as_deref()),
    }
}
