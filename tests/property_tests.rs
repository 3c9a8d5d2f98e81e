//! Property-based tests for lineage ordering and deploy/disable sequences.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::fs;

use proptest::prelude::*;
use tempfile::TempDir;

use modweave::core::config::Config;
use modweave::core::game::Game;
use modweave::core::hash::{hash_bytes, hash_file};
use modweave::core::lineage::{FileLineage, FileVersion};
use modweave::core::manifest::{ModManifest, ModMetadata};
use modweave::core::types::{ModId, OwnerId, Priority};
use modweave::engine::DeploymentEngine;

fn owner(i: u8) -> OwnerId {
    OwnerId::Mod(ModId::new(format!("m{}", i)).unwrap())
}

/// Load orders for mods `m0..m7`, as generated.
fn priority_fn(orders: &[u32]) -> impl Fn(&OwnerId) -> Priority + '_ {
    move |o: &OwnerId| match o {
        OwnerId::Game => Priority::Game,
        OwnerId::Mod(id) => {
            let i: usize = id.as_str()[1..].parse().unwrap();
            Priority::Mod(orders[i])
        }
    }
}

proptest! {
    /// Inserting in any order yields the stack sorted by priority, GAME at
    /// the bottom, each owner once.
    #[test]
    fn insert_order_is_priority_order(
        inserts in prop::collection::vec(0u8..8, 1..24),
        orders in prop::collection::vec(1u32..100, 8),
        with_game in any::<bool>(),
    ) {
        let priority = priority_fn(&orders);
        let mut lineage = FileLineage::new();
        if with_game {
            lineage.push_version(OwnerId::Game, hash_bytes(b"game"));
        }
        for i in &inserts {
            lineage.insert_ordered_version(
                FileVersion::new(owner(*i), hash_bytes(&[*i])),
                &priority,
            );
        }

        let versions = lineage.versions();
        let mut seen = std::collections::BTreeSet::new();
        for v in versions {
            prop_assert!(seen.insert(v.owner.to_string()), "duplicate owner {}", v.owner);
        }
        for pair in versions.windows(2) {
            prop_assert!(priority(&pair[0].owner) <= priority(&pair[1].owner));
        }
        if with_game {
            prop_assert_eq!(&versions[0].owner, &OwnerId::Game);
        }
        let distinct: std::collections::BTreeSet<_> = inserts.iter().collect();
        prop_assert_eq!(lineage.mod_owners().count(), distinct.len());
    }

    /// Inserting the same owner again replaces its entry.
    #[test]
    fn reinsert_is_idempotent(
        first in 0u8..8,
        others in prop::collection::vec(0u8..8, 0..8),
        orders in prop::collection::vec(1u32..100, 8),
    ) {
        let priority = priority_fn(&orders);
        let mut lineage = FileLineage::new();
        for i in others.iter().chain(std::iter::once(&first)) {
            lineage.insert_ordered_version(FileVersion::new(owner(*i), hash_bytes(&[*i])), &priority);
        }
        let before: Vec<_> = lineage.versions().iter().map(|v| v.owner.clone()).collect();

        let pos = lineage.insert_ordered_version(
            FileVersion::new(owner(first), hash_bytes(b"again")),
            &priority,
        );

        let after: Vec<_> = lineage.versions().iter().map(|v| v.owner.clone()).collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(lineage.version_of(&owner(first)).unwrap().hash.clone(), hash_bytes(b"again"));
        prop_assert!(pos < lineage.len());
    }
}

// =============================================================================
// Deploy/disable sequences
// =============================================================================

const PATHS: [&str; 3] = ["shared.txt", "dir/pair.txt", "dir/deep/solo.txt"];

#[derive(Debug, Clone)]
enum Step {
    Deploy(usize),
    Disable(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0usize..3).prop_map(Step::Deploy),
        (0usize..3).prop_map(Step::Disable),
    ]
}

/// Mod `i` ships every path whose index is `>= i`, with distinct bytes.
fn compile_mods(dir: &TempDir, engine: &DeploymentEngine) -> Vec<ModManifest> {
    (0..3)
        .map(|i| {
            let src = dir.path().join(format!("src{}", i));
            for rel in &PATHS[i..] {
                let path = src.join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, format!("mod {} {}", i, rel)).unwrap();
            }
            engine
                .compile(&src, ModMetadata::new(format!("mod{}", i), "1"))
                .unwrap()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// After every step the top of each lineage matches the live file, and
    /// once everything is disabled the vanilla tree is back.
    #[test]
    fn lineage_top_always_matches_live(steps in prop::collection::vec(step(), 1..12)) {
        let dir = TempDir::new().unwrap();
        let game = Game::new("g", dir.path().join("install"), dir.path().join("storage"));
        fs::create_dir_all(&game.install_root).unwrap();
        fs::write(game.install_root.join("shared.txt"), "vanilla").unwrap();
        let engine = DeploymentEngine::new(Config::default(), game);
        let mods = compile_mods(&dir, &engine);

        for step in &steps {
            let deployed = engine.list_deployed().unwrap();
            match step {
                Step::Deploy(i) if !deployed.iter().any(|r| r.id == mods[*i].id) => {
                    engine.deploy(&mods[*i]).unwrap();
                }
                Step::Disable(i) if deployed.iter().any(|r| r.id == mods[*i].id) => {
                    let report = engine.disable(&mods[*i].id).unwrap();
                    prop_assert!(report.is_clean());
                }
                _ => continue,
            }
            let drift = engine.verify().unwrap();
            prop_assert!(drift.is_clean(), "drift after {:?}: {:?}", step, drift.drift);
        }

        for record in engine.list_deployed().unwrap().iter().rev() {
            engine.disable(&record.id).unwrap();
        }
        let install = &engine.game().install_root;
        prop_assert_eq!(
            hash_file(&install.join("shared.txt")).unwrap().hash,
            hash_bytes(b"vanilla")
        );
        prop_assert!(!install.join("dir").exists());
        prop_assert!(FileLineage::list(engine.paths()).unwrap().is_empty());
    }
}
