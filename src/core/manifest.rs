//! core::manifest
//!
//! Mod manifests: metadata plus the exact file list of a compiled mod.
//!
//! # Lifecycle
//!
//! A manifest is created by compile and stored next to the mod's files.
//! Its file list never changes afterwards: editing rewrites metadata only,
//! and updating recompiles a whole new manifest. A copy is placed in the
//! install's `<manager>/manifests/` while the mod is deployed.
//!
//! # Schema
//!
//! ```json
//! {
//!   "id": "3f2a9c01d4e5b6a7",
//!   "gameId": "skyrim",
//!   "version": "1.2.0",
//!   "loadOrder": 3,
//!   "name": "Better Textures",
//!   "description": "",
//!   "downloadSource": "nexus",
//!   "downloadDate": "2026-01-02T03:04:05+00:00",
//!   "downloadLink": "",
//!   "tags": ["textures"],
//!   "files": [{ "filePath": "textures/x.png", "hash": "…", "size": 1024 }]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::store::{self, StoreError};
use crate::core::types::{ContentHash, LoadOrder, ModId, RelPath, UtcTimestamp};

/// One file shipped by a mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub file_path: RelPath,
    pub hash: ContentHash,
    pub size: u64,
}

/// Persisted description of a compiled mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModManifest {
    pub id: ModId,
    pub game_id: String,
    pub version: String,
    #[serde(default)]
    pub load_order: LoadOrder,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub download_source: String,
    pub download_date: UtcTimestamp,
    #[serde(default)]
    pub download_link: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub files: Vec<ManifestFile>,
}

impl ModManifest {
    /// Read a manifest document. `Ok(None)` if it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, StoreError> {
        store::read_json(path)
    }

    /// Write the manifest document atomically.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        store::write_json(path, self)
    }

    /// The metadata portion, e.g. as the base for a recompile.
    pub fn metadata(&self) -> ModMetadata {
        ModMetadata {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            download_source: self.download_source.clone(),
            download_date: Some(self.download_date.clone()),
            download_link: self.download_link.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Look up a shipped file by path.
    pub fn file(&self, rel: &RelPath) -> Option<&ManifestFile> {
        self.files.iter().find(|f| &f.file_path == rel)
    }

    /// Total bytes across all files.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Caller-supplied metadata for compile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub download_source: String,
    /// Defaults to the compile time when absent.
    #[serde(default)]
    pub download_date: Option<UtcTimestamp>,
    #[serde(default)]
    pub download_link: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ModMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Check the required fields.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("mod name is required".into());
        }
        if self.version.trim().is_empty() {
            return Err("mod version is required".into());
        }
        if let Some(tag) = self.tags.iter().find(|t| t.trim().is_empty()) {
            return Err(format!("empty tag {:?} is not allowed", tag));
        }
        Ok(())
    }
}

/// A partial metadata edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataChanges {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub download_source: Option<String>,
    pub download_date: Option<UtcTimestamp>,
    pub download_link: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}

impl MetadataChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the edit to compile metadata.
    pub fn apply(&self, meta: &mut ModMetadata) {
        if let Some(v) = &self.name {
            meta.name = v.clone();
        }
        if let Some(v) = &self.version {
            meta.version = v.clone();
        }
        if let Some(v) = &self.description {
            meta.description = v.clone();
        }
        if let Some(v) = &self.download_source {
            meta.download_source = v.clone();
        }
        if let Some(v) = &self.download_date {
            meta.download_date = Some(v.clone());
        }
        if let Some(v) = &self.download_link {
            meta.download_link = v.clone();
        }
        if let Some(v) = &self.tags {
            meta.tags = v.clone();
        }
    }

    /// Apply the edit to a manifest's metadata fields, leaving its id and
    /// file list untouched.
    pub fn apply_to_manifest(&self, manifest: &mut ModManifest) -> Result<(), String> {
        let mut meta = manifest.metadata();
        self.apply(&mut meta);
        meta.validate()?;
        manifest.name = meta.name;
        manifest.version = meta.version;
        manifest.description = meta.description;
        manifest.download_source = meta.download_source;
        if let Some(date) = meta.download_date {
            manifest.download_date = date;
        }
        manifest.download_link = meta.download_link;
        manifest.tags = meta.tags;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::hash_bytes;

    fn sample() -> ModManifest {
        ModManifest {
            id: ModId::new("abc123").unwrap(),
            game_id: "g".into(),
            version: "1.0".into(),
            load_order: 2,
            name: "Sample".into(),
            description: String::new(),
            download_source: "local".into(),
            download_date: UtcTimestamp::now(),
            download_link: String::new(),
            tags: ["ui".to_string()].into_iter().collect(),
            files: vec![ManifestFile {
                file_path: RelPath::new("a/b.txt").unwrap(),
                hash: hash_bytes(b"x"),
                size: 1,
            }],
        }
    }

    #[test]
    fn schema_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["gameId"], "g");
        assert_eq!(json["loadOrder"], 2);
        assert_eq!(json["downloadSource"], "local");
        assert_eq!(json["files"][0]["filePath"], "a/b.txt");
        assert_eq!(json["files"][0]["size"], 1);
        assert_eq!(json["tags"][0], "ui");
    }

    #[test]
    fn metadata_validation() {
        assert!(ModMetadata::new("n", "1").validate().is_ok());
        assert!(ModMetadata::new("", "1").validate().is_err());
        assert!(ModMetadata::new("n", "  ").validate().is_err());
    }

    #[test]
    fn changes_leave_files_and_id() {
        let mut manifest = sample();
        let changes = MetadataChanges {
            name: Some("Renamed".into()),
            tags: Some(BTreeSet::new()),
            ..Default::default()
        };
        changes.apply_to_manifest(&mut manifest).unwrap();
        assert_eq!(manifest.name, "Renamed");
        assert!(manifest.tags.is_empty());
        assert_eq!(manifest.id.as_str(), "abc123");
        assert_eq!(manifest.files.len(), 1);
    }

    #[test]
    fn changes_are_validated() {
        let mut manifest = sample();
        let changes = MetadataChanges {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(changes.apply_to_manifest(&mut manifest).is_err());
        assert_eq!(manifest.name, "Sample");
    }

    #[test]
    fn file_lookup() {
        let manifest = sample();
        assert!(manifest.file(&RelPath::new("a/b.txt").unwrap()).is_some());
        assert!(manifest.file(&RelPath::new("nope").unwrap()).is_none());
        assert_eq!(manifest.total_size(), 1);
    }
}
