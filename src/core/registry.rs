//! core::registry
//!
//! The Registry: which mods are deployed into a game install, and in what
//! load order.
//!
//! # Storage
//!
//! - `<manager>/game_state.json` -
//!   `{"lastModified": "...", "deployedMods": [ ... ]}`
//!
//! The document's absence is the canonical "no mods deployed" state. When
//! the last record is removed the file is deleted rather than written empty.
//!
//! # Invariants
//!
//! - Records are unique by id
//! - Records are sorted by load order after every membership change

use serde::{Deserialize, Serialize};

use crate::core::manifest::ModManifest;
use crate::core::paths::GamePaths;
use crate::core::store::{self, StoreError};
use crate::core::types::{LoadOrder, ModId, OwnerId, Priority, UtcTimestamp};

/// A deployed mod as the Registry sees it: a manifest subset plus the
/// enabled flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedModRecord {
    pub id: ModId,
    pub game_id: String,
    pub name: String,
    pub version: String,
    pub load_order: LoadOrder,
    #[serde(default)]
    pub download_source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub enabled: bool,
}

impl DeployedModRecord {
    pub fn from_manifest(manifest: &ModManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            game_id: manifest.game_id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            load_order: manifest.load_order,
            download_source: manifest.download_source.clone(),
            tags: manifest.tags.iter().cloned().collect(),
            enabled: true,
        }
    }
}

/// Ordered set of deployed mods for one game install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub last_modified: UtcTimestamp,
    deployed_mods: Vec<DeployedModRecord>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            last_modified: UtcTimestamp::now(),
            deployed_mods: Vec::new(),
        }
    }
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the Registry. A missing document means nothing is deployed.
    pub fn load(paths: &GamePaths) -> Result<Self, StoreError> {
        let mut state: Self = store::read_json(&paths.game_state_path())?.unwrap_or_default();
        state.sort();
        Ok(state)
    }

    /// Persist the Registry, deleting the document when it is empty.
    pub fn save(&mut self, paths: &GamePaths) -> Result<(), StoreError> {
        let path = paths.game_state_path();
        if self.deployed_mods.is_empty() {
            store::remove_json(&path)?;
            return Ok(());
        }
        self.last_modified = UtcTimestamp::now();
        store::write_json(&path, self)
    }

    /// Records in load order.
    pub fn records(&self) -> &[DeployedModRecord] {
        &self.deployed_mods
    }

    pub fn get(&self, id: &ModId) -> Option<&DeployedModRecord> {
        self.deployed_mods.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &ModId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.deployed_mods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deployed_mods.len()
    }

    /// Append a record and re-sort.
    pub fn append(&mut self, record: DeployedModRecord) {
        self.deployed_mods.push(record);
        self.sort();
    }

    /// Replace any record with the same id, then insert sorted.
    pub fn append_replace(&mut self, record: DeployedModRecord) {
        self.deployed_mods.retain(|r| r.id != record.id);
        self.append(record);
    }

    /// Remove the record for `id`, returning it if present.
    pub fn remove(&mut self, id: &ModId) -> Option<DeployedModRecord> {
        let index = self.deployed_mods.iter().position(|r| &r.id == id)?;
        Some(self.deployed_mods.remove(index))
    }

    /// Load order of a deployed mod, `None` if it is not deployed.
    pub fn load_order_of(&self, id: &ModId) -> Option<LoadOrder> {
        self.get(id).map(|r| r.load_order)
    }

    /// Live conflict-resolution rank of a lineage owner.
    pub fn priority_of(&self, owner: &OwnerId) -> Priority {
        match owner {
            OwnerId::Game => Priority::Game,
            OwnerId::Mod(id) => self
                .load_order_of(id)
                .map(Priority::Mod)
                .unwrap_or(Priority::Unranked),
        }
    }

    /// The load order a newly appended mod should get.
    pub fn next_load_order(&self) -> LoadOrder {
        self.deployed_mods
            .iter()
            .map(|r| r.load_order)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1)
    }

    /// Replace every record, assigning load orders `1..=n` in the given order.
    ///
    /// Used after an external reorder.
    pub fn replace_all(&mut self, records: Vec<DeployedModRecord>) {
        self.deployed_mods = Self::sequenced(records);
    }

    /// Assign sequential load orders `1..=n` in the given order.
    pub fn sequenced(records: Vec<DeployedModRecord>) -> Vec<DeployedModRecord> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.load_order = i as LoadOrder + 1;
                r
            })
            .collect()
    }

    fn sort(&mut self) {
        self.deployed_mods.sort_by_key(|r| r.load_order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

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

    fn ids(state: &GameState) -> Vec<&str> {
        state.records().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn append_sorts_by_load_order() {
        let mut state = GameState::new();
        state.append(record("b", 2));
        state.append(record("a", 1));
        state.append(record("c", 3));
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn append_replace_keeps_ids_unique() {
        let mut state = GameState::new();
        state.append(record("a", 1));
        state.append(record("b", 2));
        state.append_replace(record("a", 5));
        assert_eq!(ids(&state), vec!["b", "a"]);
        assert_eq!(state.load_order_of(&ModId::new("a").unwrap()), Some(5));
    }

    #[test]
    fn remove_by_id() {
        let mut state = GameState::new();
        state.append(record("a", 1));
        let a = ModId::new("a").unwrap();
        assert!(state.remove(&a).is_some());
        assert!(state.remove(&a).is_none());
        assert_eq!(state.load_order_of(&a), None);
    }

    #[test]
    fn priority_of_owners() {
        let mut state = GameState::new();
        state.append(record("a", 4));
        assert_eq!(state.priority_of(&OwnerId::Game), Priority::Game);
        assert_eq!(
            state.priority_of(&OwnerId::Mod(ModId::new("a").unwrap())),
            Priority::Mod(4)
        );
        assert_eq!(
            state.priority_of(&OwnerId::Mod(ModId::new("zz").unwrap())),
            Priority::Unranked
        );
    }

    #[test]
    fn replace_all_recomputes_orders() {
        let mut state = GameState::new();
        state.replace_all(vec![record("c", 9), record("a", 9), record("b", 0)]);
        assert_eq!(ids(&state), vec!["c", "a", "b"]);
        let orders: Vec<_> = state.records().iter().map(|r| r.load_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn next_load_order() {
        let mut state = GameState::new();
        assert_eq!(state.next_load_order(), 1);
        state.append(record("a", 7));
        assert_eq!(state.next_load_order(), 8);
    }

    #[test]
    fn empty_state_deletes_document() {
        let dir = TempDir::new().unwrap();
        let paths = GamePaths::new(dir.path(), dir.path().join("s"), ".mw");

        let mut state = GameState::new();
        state.append(record("a", 1));
        state.save(&paths).unwrap();
        assert!(paths.game_state_path().exists());

        let mut loaded = GameState::load(&paths).unwrap();
        assert_eq!(ids(&loaded), vec!["a"]);

        loaded.remove(&ModId::new("a").unwrap());
        loaded.save(&paths).unwrap();
        assert!(!paths.game_state_path().exists());
        assert!(GameState::load(&paths).unwrap().is_empty());
    }

    #[test]
    fn persisted_schema() {
        let mut state = GameState::new();
        state.append(record("a", 1));
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["lastModified"].is_string());
        assert_eq!(json["deployedMods"][0]["loadOrder"], 1);
        assert_eq!(json["deployedMods"][0]["enabled"], true);
        assert_eq!(json["deployedMods"][0]["gameId"], "g");
    }
}
