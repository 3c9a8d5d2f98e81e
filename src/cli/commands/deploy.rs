//! deploy, disable, enable and reorder commands

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::types::{LoadOrder, ModId};
use crate::engine::{DeployReport, ReconcileReport};

/// Deploy a stored mod.
pub fn deploy(ctx: &Context, id: &ModId, load_order: Option<LoadOrder>) -> Result<()> {
    let engine = ctx.engine()?;
    let result = match load_order {
        Some(order) => engine.stored_manifest(id).and_then(|mut manifest| {
            manifest.load_order = order;
            engine.deploy(&manifest)
        }),
        None => engine.deploy_id(id),
    };
    let report = result.with_context(|| format!("failed to deploy '{}'", id))?;
    print_deploy(ctx, &report);
    Ok(())
}

/// Disable a deployed mod.
pub fn disable(ctx: &Context, id: &ModId) -> Result<()> {
    let engine = ctx.engine()?;
    let report = engine
        .disable(id)
        .with_context(|| format!("failed to disable '{}'", id))?;

    ctx.say(format!(
        "Disabled {} ({} removed, {} restored, {} unchanged)",
        id,
        report.removed.len(),
        report.restored.len(),
        report.unchanged.len()
    ));
    for (path, error) in &report.failures {
        eprintln!("  failed: {}: {}", path, error);
    }
    if let Some(trash) = &report.trash {
        ctx.say(format!("Trash: {}", trash.display()));
    }
    if !report.is_clean() {
        anyhow::bail!("{} file(s) could not be restored", report.failures.len());
    }
    Ok(())
}

/// Deploy a stored mod at the end of the load order.
pub fn enable(ctx: &Context, id: &ModId) -> Result<()> {
    let engine = ctx.engine()?;
    let changed = engine
        .set_enabled(id, true)
        .with_context(|| format!("failed to enable '{}'", id))?;
    if changed {
        ctx.say(format!("Enabled {}", id));
    } else {
        ctx.say(format!("{} is already deployed", id));
    }
    Ok(())
}

/// Reorder deployed mods.
pub fn reorder(ctx: &Context, ids: &[ModId]) -> Result<()> {
    let engine = ctx.engine()?;
    let report = engine.reorder(ids).context("failed to reorder")?;
    print_reconcile(ctx, &report);
    Ok(())
}

fn print_deploy(ctx: &Context, report: &DeployReport) {
    ctx.say(format!(
        "Deployed {} at load order {} ({} live, {} shadowed)",
        report.mod_id,
        report.load_order,
        report.won.len(),
        report.shadowed.len()
    ));
    if !report.backed_up.is_empty() {
        ctx.say(format!("  backed up {} game file(s)", report.backed_up.len()));
    }
    for path in &report.repaired {
        ctx.say(format!("  repaired drift at {}", path));
    }
}

fn print_reconcile(ctx: &Context, report: &ReconcileReport) {
    if report.is_noop() {
        ctx.say("Load order unchanged");
        return;
    }
    for (id, order) in &report.deployed {
        ctx.say(format!("  {:>3}  {}", order, id));
    }
    ctx.say(format!(
        "Redeployed {} mod(s), {} unchanged",
        report.deployed.len(),
        report.unchanged.len()
    ));
    if report.file_failures > 0 {
        eprintln!("warning: {} file(s) failed during disable", report.file_failures);
    }
}
