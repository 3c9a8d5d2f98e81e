//! edit, update and delete commands

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::manifest::MetadataChanges;
use crate::core::types::ModId;

/// Rewrite a stored mod's metadata.
pub fn edit(ctx: &Context, id: &ModId, changes: &MetadataChanges) -> Result<()> {
    if changes.is_empty() {
        ctx.say("Nothing to change");
        return Ok(());
    }
    let engine = ctx.engine()?;
    let manifest = engine
        .edit_metadata(id, changes)
        .with_context(|| format!("failed to edit '{}'", id))?;
    ctx.say(format!("Updated {} ({} {})", manifest.id, manifest.name, manifest.version));
    Ok(())
}

/// Recompile a stored mod.
pub fn update(
    ctx: &Context,
    id: &ModId,
    from: Option<&Path>,
    changes: &MetadataChanges,
) -> Result<()> {
    let engine = ctx.engine()?;
    let manifest = engine
        .update(id, from, changes)
        .with_context(|| format!("failed to update '{}'", id))?;
    if &manifest.id == id {
        ctx.say(format!("Updated {} ({} files)", id, manifest.files.len()));
    } else {
        ctx.say(format!(
            "Updated {} -> {} ({} files)",
            id,
            manifest.id,
            manifest.files.len()
        ));
    }
    Ok(())
}

/// Move a stored mod to trash.
pub fn delete(ctx: &Context, id: &ModId) -> Result<()> {
    let engine = ctx.engine()?;
    let trash = engine
        .delete_stored(id)
        .with_context(|| format!("failed to delete '{}'", id))?;
    ctx.say(format!("Deleted {} (moved to {})", id, trash.display()));
    Ok(())
}
