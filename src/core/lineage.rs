//! core::lineage
//!
//! Per-path ownership stacks.
//!
//! # Architecture
//!
//! A [`FileLineage`] records every contributor that currently claims one
//! managed path, ordered by priority from bottom to top. The top entry is
//! the owner whose bytes are live. When an owner goes away the entry below
//! it tells the engine what content must come back, and from where.
//!
//! "Top" means highest priority, not most recently pushed: entries are
//! placed with [`FileLineage::insert_ordered_version`], which consults the
//! live load order of every owner at insertion time. Priorities are never
//! cached in the entries, so reordering mods changes future outcomes
//! without rewriting existing lineages.
//!
//! # Invariants
//!
//! - A `GAME` entry, if present, is the bottom-most entry
//! - Mod entries are in strictly ascending load order from bottom to top
//! - Each owner appears at most once
//! - After any completed operation the top hash equals the live file's hash
//!
//! # Storage
//!
//! - `<manager>/lineages/<relPath>.json` - `{"stack": [{modId, hash, timestamp}]}`
//!
//! A lineage file is deleted as soon as its stack becomes empty.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::fsops;
use crate::core::paths::GamePaths;
use crate::core::store::{self, StoreError};
use crate::core::types::{ContentHash, OwnerId, Priority, RelPath, UtcTimestamp};

/// One ownership record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    /// The owning mod, or `GAME`.
    #[serde(rename = "modId")]
    pub owner: OwnerId,
    /// Hash of the bytes this owner ships for the path.
    pub hash: ContentHash,
    /// When the claim was recorded.
    pub timestamp: UtcTimestamp,
}

impl FileVersion {
    /// Create a version stamped with the current time.
    pub fn new(owner: OwnerId, hash: ContentHash) -> Self {
        Self {
            owner,
            hash,
            timestamp: UtcTimestamp::now(),
        }
    }
}

/// Priority-ordered ownership sequence for one managed path.
///
/// # Example
///
/// ```
/// use modweave::core::lineage::{FileLineage, FileVersion};
/// use modweave::core::hash::hash_bytes;
/// use modweave::core::types::{ModId, OwnerId, Priority};
///
/// let a = OwnerId::Mod(ModId::new("a").unwrap());
/// let b = OwnerId::Mod(ModId::new("b").unwrap());
/// let priority = |owner: &OwnerId| match owner.as_str() {
///     "GAME" => Priority::Game,
///     "a" => Priority::Mod(1),
///     _ => Priority::Mod(2),
/// };
///
/// let mut lineage = FileLineage::new();
/// lineage.push_version(OwnerId::Game, hash_bytes(b"vanilla"));
/// lineage.insert_ordered_version(FileVersion::new(b.clone(), hash_bytes(b"b")), &priority);
///
/// // a has lower priority than b: it lands below the top
/// let pos = lineage.insert_ordered_version(FileVersion::new(a, hash_bytes(b"a")), &priority);
/// assert_eq!(pos, 1);
/// assert_eq!(lineage.peek().unwrap().owner, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLineage {
    /// Bottom-to-top.
    stack: Vec<FileVersion>,
}

impl FileLineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The top entry: the owner whose bytes are live.
    pub fn peek(&self) -> Option<&FileVersion> {
        self.stack.last()
    }

    /// Append `owner` on top unconditionally.
    ///
    /// Only valid when the caller has already established that this owner
    /// outranks everything below it (e.g. seeding `[GAME, mod]`).
    pub fn push_version(&mut self, owner: OwnerId, hash: ContentHash) {
        self.stack.push(FileVersion::new(owner, hash));
    }

    /// Insert an entry at the position its priority dictates.
    ///
    /// Any existing entry for the same owner is removed first. The stack is
    /// then scanned from the top down, and the new entry is placed directly
    /// above the first entry whose priority is less than or equal to its
    /// own (so among equals the newcomer wins). `GAME` always ranks lowest.
    ///
    /// Returns the entry's distance from the top: `0` means it is the new
    /// live owner, anything greater means it is shadowed.
    pub fn insert_ordered_version<F>(&mut self, entry: FileVersion, priority_of: F) -> usize
    where
        F: Fn(&OwnerId) -> Priority,
    {
        let removed = self.remove_all_of(&entry.owner);
        if removed > 0 {
            debug!(
                owner = %entry.owner,
                removed,
                "corrected lineage: dropped existing entries before ordered insert"
            );
        }

        let new_priority = rank(&entry.owner, &priority_of);
        let mut index = 0;
        for (i, existing) in self.stack.iter().enumerate().rev() {
            if rank(&existing.owner, &priority_of) <= new_priority {
                index = i + 1;
                break;
            }
        }
        self.stack.insert(index, entry);
        self.stack.len() - 1 - index
    }

    /// Remove every entry owned by `owner`, keeping the order of the rest.
    ///
    /// Returns how many entries were removed.
    pub fn remove_all_of(&mut self, owner: &OwnerId) -> usize {
        let before = self.stack.len();
        self.stack.retain(|v| &v.owner != owner);
        before - self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Entries bottom-to-top.
    pub fn versions(&self) -> &[FileVersion] {
        &self.stack
    }

    pub fn contains(&self, owner: &OwnerId) -> bool {
        self.stack.iter().any(|v| &v.owner == owner)
    }

    /// The entry for `owner`, if any.
    pub fn version_of(&self, owner: &OwnerId) -> Option<&FileVersion> {
        self.stack.iter().find(|v| &v.owner == owner)
    }

    /// Whether the only remaining claimant is vanilla content.
    pub fn is_game_only(&self) -> bool {
        self.stack.len() == 1 && self.stack[0].owner.is_game()
    }

    /// Mod owners, bottom-to-top.
    pub fn mod_owners(&self) -> impl Iterator<Item = &OwnerId> {
        self.stack.iter().map(|v| &v.owner).filter(|o| !o.is_game())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Read the lineage for `rel`. `Ok(None)` means the path is untracked.
    pub fn load(paths: &GamePaths, rel: &RelPath) -> Result<Option<Self>, StoreError> {
        store::read_json(&paths.lineage_path(rel))
    }

    /// Persist the lineage for `rel`.
    ///
    /// An empty lineage is deleted instead of written.
    pub fn save(&self, paths: &GamePaths, rel: &RelPath) -> Result<(), StoreError> {
        if self.is_empty() {
            return Self::delete(paths, rel);
        }
        store::write_json(&paths.lineage_path(rel), self)
    }

    /// Delete the lineage record for `rel` and prune emptied directories.
    pub fn delete(paths: &GamePaths, rel: &RelPath) -> Result<(), StoreError> {
        let path = paths.lineage_path(rel);
        if store::remove_json(&path)? {
            if let Some(parent) = path.parent() {
                fsops::prune_empty_dirs(parent, &paths.lineages_dir());
            }
        }
        Ok(())
    }

    /// Every managed path that currently has a lineage record.
    pub fn list(paths: &GamePaths) -> Result<Vec<RelPath>, fsops::FsError> {
        let root = paths.lineages_dir();
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for file in fsops::list_files(&root)? {
            let Some(raw) = file.to_str() else { continue };
            let Some(stripped) = raw.strip_suffix(".json") else {
                continue;
            };
            if let Ok(rel) = RelPath::new(stripped) {
                out.push(rel);
            }
        }
        Ok(out)
    }
}

fn rank<F>(owner: &OwnerId, priority_of: &F) -> Priority
where
    F: Fn(&OwnerId) -> Priority,
{
    if owner.is_game() {
        Priority::Game
    } else {
        priority_of(owner)
    }
}
