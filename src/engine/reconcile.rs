//! engine::reconcile
//!
//! Bring the Registry in line with a desired set of records.
//!
//! # Algorithm
//!
//! 1. Records identical in id and load order are left alone
//! 2. Records missing from the desired set, or marked `enabled: false`,
//!    are disabled
//! 3. Records whose load order changed are disabled and redeployed
//! 4. New records are deployed
//!
//! The disable pass runs first, in descending current load order, so paths
//! are freed before they are claimed again. The deploy pass follows in
//! ascending desired load order. Everything runs sequentially.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::registry::{DeployedModRecord, GameState};
use crate::core::types::{LoadOrder, ModId};

use super::{DeploymentEngine, EngineError};

/// Outcome of a reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub unchanged: Vec<ModId>,
    pub disabled: Vec<ModId>,
    pub deployed: Vec<(ModId, LoadOrder)>,
    /// Paths that failed during disable passes.
    pub file_failures: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.disabled.is_empty() && self.deployed.is_empty()
    }
}

/// The diff between the Registry and a desired state.
#[derive(Debug, Default, PartialEq, Eq)]
struct Plan {
    unchanged: Vec<ModId>,
    disable: Vec<ModId>,
    deploy: Vec<(ModId, LoadOrder)>,
}

fn plan(current: &GameState, desired: &[DeployedModRecord]) -> Result<Plan, EngineError> {
    let mut wanted: BTreeMap<&ModId, LoadOrder> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for record in desired {
        if !seen.insert(&record.id) {
            return Err(EngineError::Validation(format!(
                "mod '{}' appears more than once in the desired state",
                record.id
            )));
        }
        if record.enabled {
            if record.load_order == 0 {
                return Err(EngineError::Validation(format!(
                    "mod '{}' needs a load order of at least 1",
                    record.id
                )));
            }
            wanted.insert(&record.id, record.load_order);
        }
    }

    let mut result = Plan::default();

    let mut to_disable: Vec<&DeployedModRecord> = current
        .records()
        .iter()
        .filter(|r| wanted.get(&r.id) != Some(&r.load_order))
        .collect();
    to_disable.sort_by(|a, b| b.load_order.cmp(&a.load_order));
    result.disable = to_disable.into_iter().map(|r| r.id.clone()).collect();

    for record in current.records() {
        if wanted.get(&record.id) == Some(&record.load_order) {
            result.unchanged.push(record.id.clone());
        }
    }

    let mut to_deploy: Vec<(ModId, LoadOrder)> = wanted
        .into_iter()
        .filter(|(id, order)| current.load_order_of(id) != Some(*order))
        .map(|(id, order)| (id.clone(), order))
        .collect();
    to_deploy.sort_by_key(|(_, order)| *order);
    result.deploy = to_deploy;

    Ok(result)
}

impl DeploymentEngine {
    /// Reconcile the Registry with `desired`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for duplicate ids or a zero load order
    /// - [`EngineError::NotFound`] if a record names a mod that is not stored
    /// - The first disable or deploy error; earlier steps stay applied
    pub fn reconcile(&self, desired: &[DeployedModRecord]) -> Result<ReconcileReport, EngineError> {
        let _lock = self.lock()?;
        self.reconcile_locked(desired)
    }

    pub(crate) fn reconcile_locked(
        &self,
        desired: &[DeployedModRecord],
    ) -> Result<ReconcileReport, EngineError> {
        let current = GameState::load(self.paths())?;
        let plan = plan(&current, desired)?;

        // Check every deploy target up front so a missing mod fails before
        // anything is disabled.
        let manifests = plan
            .deploy
            .iter()
            .map(|(id, _)| self.stored_manifest(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = ReconcileReport {
            unchanged: plan.unchanged,
            ..Default::default()
        };

        for id in &plan.disable {
            let disabled = self.disable_locked(id)?;
            report.file_failures += disabled.failures.len();
            report.disabled.push(id.clone());
        }
        for (manifest, (id, order)) in manifests.iter().zip(&plan.deploy) {
            self.deploy_locked(manifest, *order)?;
            report.deployed.push((id.clone(), *order));
        }

        tracing::info!(
            unchanged = report.unchanged.len(),
            disabled = report.disabled.len(),
            deployed = report.deployed.len(),
            "reconciled registry"
        );
        Ok(report)
    }

    /// Reorder deployed mods.
    ///
    /// `ids` come first in the given order; deployed mods not listed keep
    /// their relative order after them. Load orders are recomputed as
    /// `1..=n` and mods whose slot changed are redeployed.
    pub fn reorder(&self, ids: &[ModId]) -> Result<ReconcileReport, EngineError> {
        let _lock = self.lock()?;
        let current = GameState::load(self.paths())?;

        let mut listed = Vec::with_capacity(ids.len());
        let mut seen = BTreeSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(EngineError::Validation(format!("mod '{}' listed twice", id)));
            }
            let record = current
                .get(id)
                .ok_or_else(|| EngineError::NotFound(format!("deployed mod '{}'", id)))?;
            listed.push(record.clone());
        }
        listed.extend(
            current
                .records()
                .iter()
                .filter(|r| !seen.contains(&r.id))
                .cloned(),
        );

        self.reconcile_locked(&GameState::sequenced(listed))
    }

    /// Enable (deploy at the end of the load order) or disable a mod.
    ///
    /// Returns `false` when the mod was already in the requested state.
    pub fn set_enabled(&self, id: &ModId, enabled: bool) -> Result<bool, EngineError> {
        let _lock = self.lock()?;
        let state = GameState::load(self.paths())?;
        match (enabled, state.contains(id)) {
            (true, false) => {
                let manifest = self.stored_manifest(id)?;
                self.deploy_locked(&manifest, state.next_load_order())?;
                Ok(true)
            }
            (false, true) => {
                self.disable_locked(id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, order: LoadOrder) -> DeployedModRecord {
        DeployedModRecord {
            id: ModId::new(id).unwrap(),
            game_id: "g".into(),
            name: id.into(),
            version: "1".into(),
            load_order: order,
            download_source: String::new(),
            tags: Vec::new(),
            enabled: true,
        }
    }

    fn state(records: Vec<DeployedModRecord>) -> GameState {
        let mut state = GameState::new();
        for r in records {
            state.append(r);
        }
        state
    }

    fn id(s: &str) -> ModId {
        ModId::new(s).unwrap()
    }

    #[test]
    fn identical_records_are_unchanged() {
        let current = state(vec![record("a", 1), record("b", 2)]);
        let plan = plan(&current, &[record("a", 1), record("b", 2)]).unwrap();
        assert_eq!(plan.unchanged, vec![id("a"), id("b")]);
        assert!(plan.disable.is_empty());
        assert!(plan.deploy.is_empty());
    }

    #[test]
    fn removed_and_disabled_records_are_disabled() {
        let current = state(vec![record("a", 1), record("b", 2), record("c", 3)]);
        let mut off = record("b", 2);
        off.enabled = false;
        let plan = plan(&current, &[record("a", 1), off]).unwrap();
        assert_eq!(plan.disable, vec![id("c"), id("b")]);
        assert!(plan.deploy.is_empty());
    }

    #[test]
    fn moved_records_are_redeployed() {
        let current = state(vec![record("a", 1), record("b", 2)]);
        let plan = plan(&current, &[record("b", 1), record("a", 2)]).unwrap();
        assert_eq!(plan.disable, vec![id("b"), id("a")]);
        assert_eq!(plan.deploy, vec![(id("b"), 1), (id("a"), 2)]);
    }

    #[test]
    fn new_records_are_deployed_in_order() {
        let current = state(vec![]);
        let plan = plan(&current, &[record("z", 3), record("y", 1)]).unwrap();
        assert_eq!(plan.deploy, vec![(id("y"), 1), (id("z"), 3)]);
    }

    #[test]
    fn duplicates_rejected() {
        let current = state(vec![]);
        assert!(matches!(
            plan(&current, &[record("a", 1), record("a", 2)]),
            Err(EngineError::Validation(_))
        ));
    }
}
