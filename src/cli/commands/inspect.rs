//! Read-only commands: list, status, conflicts, verify
//!
//! None of these take the install lock.

use anyhow::{bail, Result};

use crate::cli::Context;

/// List stored or deployed mods.
pub fn list(ctx: &Context, deployed: bool, json: bool) -> Result<()> {
    let engine = ctx.engine()?;

    if deployed {
        let records = engine.list_deployed()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }
        if records.is_empty() {
            ctx.say("No mods deployed");
        }
        for r in &records {
            println!("{:>3}  {}  {} {}", r.load_order, r.id, r.name, r.version);
        }
        return Ok(());
    }

    let manifests = engine.list_stored()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(());
    }
    if manifests.is_empty() {
        ctx.say("No mods stored");
    }
    let state = engine.list_deployed()?;
    for m in &manifests {
        let mark = match state.iter().find(|r| r.id == m.id) {
            Some(r) => format!("[{:>3}]", r.load_order),
            None => "[   ]".to_string(),
        };
        println!("{} {}  {} {}  ({} files)", mark, m.id, m.name, m.version, m.files.len());
    }
    Ok(())
}

/// Show deployed mods and interrupted merges.
pub fn status(ctx: &Context) -> Result<()> {
    let engine = ctx.engine()?;
    let game = engine.game();
    println!("Game: {} ({})", game.id, game.install_root.display());

    let records = engine.list_deployed()?;
    println!("Deployed: {}", records.len());
    for r in &records {
        println!("  {:>3}  {}  {} {}", r.load_order, r.id, r.name, r.version);
    }

    let pending = engine.pending_merges()?;
    if !pending.is_empty() {
        println!();
        println!("Interrupted merges: {}", pending.len());
        for journal in &pending {
            println!(
                "  {}  {}  {}/{} merged",
                journal.op_id,
                journal.command,
                journal.merged_count(),
                journal.entries.len()
            );
        }
        println!("Run 'modweave recover --resume <op>' or '--discard <op>'.");
    }
    Ok(())
}

/// Show overlapping paths.
pub fn conflicts(ctx: &Context) -> Result<()> {
    let engine = ctx.engine()?;
    let conflicts = engine.conflicts()?;
    if conflicts.is_empty() {
        ctx.say("No conflicts");
        return Ok(());
    }
    for c in &conflicts {
        let shadowed: Vec<&str> = c.shadowed.iter().map(|o| o.as_str()).collect();
        println!("{}  {} > {}", c.path, c.winner, shadowed.join(" > "));
    }
    Ok(())
}

/// Check live files against their lineages. Fails on drift.
pub fn verify(ctx: &Context) -> Result<()> {
    let engine = ctx.engine()?;
    let report = engine.verify()?;
    if report.is_clean() {
        ctx.say(format!("OK: {} managed path(s) match", report.checked));
        return Ok(());
    }
    for d in &report.drift {
        match &d.actual {
            Some(actual) => println!(
                "drift    {}  expected {} from {}, found {}",
                d.path,
                d.expected.short(),
                d.expected_owner,
                actual.short()
            ),
            None => println!(
                "missing  {}  expected {} from {}",
                d.path,
                d.expected.short(),
                d.expected_owner
            ),
        }
    }
    bail!(
        "{} of {} managed path(s) drifted",
        report.drift.len(),
        report.checked
    )
}
