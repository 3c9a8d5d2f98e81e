//! compile command - Store a mod directory

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::manifest::ModMetadata;

/// Compile `source` into mod storage, optionally deploying it.
pub fn compile(ctx: &Context, source: &Path, metadata: &ModMetadata, deploy: bool) -> Result<()> {
    let engine = ctx.engine()?;
    let manifest = engine
        .compile(source, metadata.clone())
        .with_context(|| format!("failed to compile '{}'", source.display()))?;

    ctx.say(format!(
        "Stored {} {} as {} ({} files, {} bytes)",
        manifest.name,
        manifest.version,
        manifest.id,
        manifest.files.len(),
        manifest.total_size()
    ));

    if deploy {
        let report = engine
            .deploy(&manifest)
            .with_context(|| format!("failed to deploy '{}'", manifest.id))?;
        ctx.say(format!(
            "Deployed {} at load order {} ({} live, {} shadowed)",
            manifest.id,
            report.load_order,
            report.won.len(),
            report.shadowed.len()
        ));
    }
    Ok(())
}
