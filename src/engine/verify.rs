//! engine::verify
//!
//! Read-only inspection of the live tree against its lineages.
//!
//! # Checks
//!
//! - [`DeploymentEngine::verify`] walks every lineage record and reports
//!   paths whose live file is missing or differs from the lineage top
//! - [`DeploymentEngine::conflicts`] lists paths claimed by more than one
//!   deployed mod, with the winner and the shadowed owners
//!
//! Neither takes the DirectoryLock. During a concurrent deploy they may
//! report transient drift.

use std::collections::BTreeMap;

use crate::core::hash;
use crate::core::lineage::FileLineage;
use crate::core::manifest::ModManifest;
use crate::core::registry::GameState;
use crate::core::types::{ContentHash, OwnerId, RelPath};

use super::{DeploymentEngine, EngineError};

/// One path whose live content does not match its lineage top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftEntry {
    pub path: RelPath,
    pub expected_owner: OwnerId,
    pub expected: ContentHash,
    /// `None` when the live file is missing.
    pub actual: Option<ContentHash>,
}

/// Result of [`DeploymentEngine::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Number of lineage records checked.
    pub checked: usize,
    pub drift: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
    }
}

/// A path claimed by more than one mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: RelPath,
    pub winner: OwnerId,
    /// Owners below the winner, highest first.
    pub shadowed: Vec<OwnerId>,
}

impl DeploymentEngine {
    /// Compare every live managed file with its lineage top.
    pub fn verify(&self) -> Result<DriftReport, EngineError> {
        let mut report = DriftReport::default();
        for rel in FileLineage::list(self.paths())? {
            let Some(lineage) = FileLineage::load(self.paths(), &rel)? else {
                continue;
            };
            let Some(top) = lineage.peek() else { continue };
            report.checked += 1;

            let live = self.paths().live_path(&rel);
            let actual = hash::probe(&live)
                .map_err(|e| EngineError::io(&live, e))?
                .digest()
                .map(|d| d.hash.clone());
            if actual.as_ref() != Some(&top.hash) {
                tracing::debug!(path = %rel, owner = %top.owner, "drift detected");
                report.drift.push(DriftEntry {
                    path: rel,
                    expected_owner: top.owner.clone(),
                    expected: top.hash.clone(),
                    actual,
                });
            }
        }
        Ok(report)
    }

    /// Paths where deployed mods overlap, sorted by path.
    pub fn conflicts(&self) -> Result<Vec<ConflictEntry>, EngineError> {
        let state = GameState::load(self.paths())?;
        let mut by_path: BTreeMap<RelPath, ConflictEntry> = BTreeMap::new();

        for record in state.records() {
            let manifest = match ModManifest::read(&self.paths().manifest_path(&record.id))? {
                Some(m) => m,
                None => {
                    tracing::warn!(mod_id = %record.id, "deployed manifest missing; skipping");
                    continue;
                }
            };
            for file in &manifest.files {
                if by_path.contains_key(&file.file_path) {
                    continue;
                }
                let Some(lineage) = FileLineage::load(self.paths(), &file.file_path)? else {
                    continue;
                };
                if lineage.mod_owners().count() < 2 {
                    continue;
                }
                let mut owners = lineage.versions().iter().rev().map(|v| v.owner.clone());
                let Some(winner) = owners.next() else { continue };
                by_path.insert(
                    file.file_path.clone(),
                    ConflictEntry {
                        path: file.file_path.clone(),
                        winner,
                        shadowed: owners.collect(),
                    },
                );
            }
        }
        Ok(by_path.into_values().collect())
    }
}
