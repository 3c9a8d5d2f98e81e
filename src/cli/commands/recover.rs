//! recover command - Resume or discard interrupted merges

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::ops::journal::OpId;

/// List interrupted merges, or resume/discard one of them.
pub fn recover(ctx: &Context, resume: Option<&str>, discard: Option<&str>) -> Result<()> {
    let engine = ctx.engine()?;

    if let Some(op) = resume {
        let op_id = OpId::from_string(op);
        engine
            .resume_merge(&op_id)
            .with_context(|| format!("failed to resume merge {}", op_id))?;
        ctx.say(format!("Resumed merge {}", op_id));
        return Ok(());
    }

    if let Some(op) = discard {
        let op_id = OpId::from_string(op);
        let trash = engine
            .discard_merge(&op_id)
            .with_context(|| format!("failed to discard merge {}", op_id))?;
        ctx.say(format!("Discarded merge {}", op_id));
        if let Some(dir) = trash {
            ctx.say(format!("Staging moved to {}", dir.display()));
        }
        ctx.say("Files already merged stay in place; run 'modweave verify' to check.");
        return Ok(());
    }

    let pending = engine.pending_merges()?;
    if pending.is_empty() {
        ctx.say("No interrupted merges");
        return Ok(());
    }
    for journal in &pending {
        println!(
            "{}  {}  {:?}  started {}  {}/{} merged",
            journal.op_id,
            journal.command,
            journal.phase,
            journal.started_at,
            journal.merged_count(),
            journal.entries.len()
        );
        if let Some(error) = &journal.error {
            println!("    error: {}", error);
        }
    }
    Ok(())
}
