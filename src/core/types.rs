//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ModId`] - Validated mod identifier
//! - [`OwnerId`] - Lineage owner: a mod or the `GAME` sentinel
//! - [`ContentHash`] - Lowercase hex SHA-256 of a file's contents
//! - [`RelPath`] - Normalized path relative to the game install root
//! - [`Priority`] - Conflict-resolution rank of a lineage owner
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. A `RelPath` can
//! never escape the install root and a `ModId` can never collide with
//! the `GAME` sentinel.
//!
//! # Examples
//!
//! ```
//! use modweave::core::types::{ModId, OwnerId, RelPath};
//!
//! let id = ModId::new("a1b2c3d4e5f60718").unwrap();
//! let owner = OwnerId::Mod(id);
//! assert!(!owner.is_game());
//!
//! let path = RelPath::new("textures\\x.png").unwrap();
//! assert_eq!(path.as_str(), "textures/x.png");
//!
//! assert!(ModId::new("GAME").is_err());
//! assert!(RelPath::new("../etc/passwd").is_err());
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Lineage owner string used for unmodified game content.
pub const GAME_OWNER: &str = "GAME";

/// Number of hex characters kept from the id digest.
const MOD_ID_LEN: usize = 16;

/// Integer priority of a deployed mod. Higher values apply later and win.
pub type LoadOrder = u32;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid mod id: {0}")]
    InvalidModId(String),

    #[error("invalid managed path: {0}")]
    InvalidRelPath(String),

    #[error("invalid content hash: {0}")]
    InvalidHash(String),
}

/// A validated mod identifier.
///
/// Ids are used as file names under the manager and storage directories,
/// so they are restricted to ASCII alphanumerics, `-` and `_`.
///
/// # Example
///
/// ```
/// use modweave::core::types::ModId;
///
/// let id = ModId::generate("skyrim", "Better Textures", "1.2.0");
/// assert_eq!(id.as_str().len(), 16);
///
/// // Same inputs produce the same id
/// assert_eq!(id, ModId::generate("skyrim", "Better Textures", "1.2.0"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModId(String);

impl ModId {
    /// Create a new validated mod id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidModId` if the id is empty, too long,
    /// contains characters outside `[A-Za-z0-9_-]`, or equals the `GAME`
    /// sentinel.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidModId("mod id cannot be empty".into()));
        }
        if id.len() > 64 {
            return Err(TypeError::InvalidModId(format!(
                "mod id too long ({} chars): {}",
                id.len(),
                id
            )));
        }
        if id == GAME_OWNER {
            return Err(TypeError::InvalidModId(format!(
                "'{}' is reserved for game content",
                GAME_OWNER
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(TypeError::InvalidModId(format!(
                "mod id contains invalid character {:?}: {}",
                c, id
            )));
        }
        Ok(Self(id))
    }

    /// Derive the id of a mod from its identity fields.
    ///
    /// The id is the first 16 hex characters of SHA-256 over
    /// `game_id \0 name \0 version`, so a new name or version yields a new id.
    pub fn generate(game_id: &str, name: &str, version: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(game_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(version.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..MOD_ID_LEN].to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl std::str::FromStr for ModId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<ModId> for String {
    fn from(id: ModId) -> Self {
        id.0
    }
}

impl AsRef<str> for ModId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The owner of one lineage entry.
///
/// Serialized as the mod id string, or `"GAME"` for vanilla content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OwnerId {
    /// Unmodified game content, always the lowest priority.
    Game,
    /// A deployed mod.
    Mod(ModId),
}

impl OwnerId {
    /// Parse an owner string, mapping `"GAME"` to [`OwnerId::Game`].
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s == GAME_OWNER {
            Ok(OwnerId::Game)
        } else {
            ModId::new(s).map(OwnerId::Mod)
        }
    }

    /// Check if this is the game sentinel.
    pub fn is_game(&self) -> bool {
        matches!(self, OwnerId::Game)
    }

    /// Get the mod id, if this owner is a mod.
    pub fn as_mod(&self) -> Option<&ModId> {
        match self {
            OwnerId::Game => None,
            OwnerId::Mod(id) => Some(id),
        }
    }

    /// Get the owner as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            OwnerId::Game => GAME_OWNER,
            OwnerId::Mod(id) => id.as_str(),
        }
    }
}

impl From<ModId> for OwnerId {
    fn from(id: ModId) -> Self {
        OwnerId::Mod(id)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.as_str().to_string()
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conflict-resolution rank of a lineage owner.
///
/// Ordering: `Game < Unranked < Mod(0) < Mod(1) < ...`. `Unranked` is used
/// for a mod owner that has no Registry entry (e.g. a lineage left behind by
/// an interrupted operation); it still outranks vanilla content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Game,
    Unranked,
    Mod(LoadOrder),
}

/// Lowercase hex SHA-256 of a file's contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Create a validated content hash, normalizing to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidHash` unless the value is 64 hex characters.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into().to_ascii_lowercase();
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHash(hash));
        }
        Ok(Self(hash))
    }

    /// Build a hash from a finished SHA-256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Get the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log output.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A managed path: relative to the game install root, `/`-separated.
///
/// Normalization converts `\` to `/`, drops `.` and empty components, and
/// rejects anything that is absolute or contains `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Create a normalized managed path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRelPath` for empty, absolute, or escaping paths.
    pub fn new(path: impl AsRef<str>) -> Result<Self, TypeError> {
        let raw = path.as_ref();
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(TypeError::InvalidRelPath(format!(
                "path must be relative: {}",
                raw
            )));
        }
        let mut parts = Vec::new();
        for part in unified.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(TypeError::InvalidRelPath(format!(
                        "path cannot contain '..': {}",
                        raw
                    )))
                }
                p if parts.is_empty() && p.len() == 2 && p.ends_with(':') => {
                    return Err(TypeError::InvalidRelPath(format!(
                        "path must not carry a drive prefix: {}",
                        raw
                    )))
                }
                p => parts.push(p),
            }
        }
        if parts.is_empty() {
            return Err(TypeError::InvalidRelPath(format!(
                "path cannot be empty: {:?}",
                raw
            )));
        }
        Ok(Self(parts.join("/")))
    }

    /// Create a managed path from a filesystem path relative to some root.
    pub fn from_path(path: &Path) -> Result<Self, TypeError> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(TypeError::InvalidRelPath(format!(
                        "path must be relative and inside the root: {}",
                        path.display()
                    )))
                }
            }
        }
        Self::new(parts.join("/"))
    }

    /// Resolve this path under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for part in self.0.split('/') {
            out.push(part);
        }
        out
    }

    /// Resolve this path under `root` with `suffix` appended to the file name.
    ///
    /// Used for `<relPath>.json` lineage records and `<relPath>.backup` files.
    pub fn under_with_suffix(&self, root: &Path, suffix: &str) -> PathBuf {
        let mut out = self.under(root);
        let mut name = out.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        out.set_file_name(name);
        out
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RelPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelPath> for String {
    fn from(path: RelPath) -> Self {
        path.0
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp, serialized as RFC3339.
///
/// # Example
///
/// ```
/// use modweave::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// println!("Current time: {}", now);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Create a timestamp from seconds since the Unix epoch.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp(secs, 0).map(Self)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }

    /// Seconds since the Unix epoch.
    pub fn unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Time elapsed since this timestamp (negative if it lies in the future).
    pub fn age(&self) -> chrono::Duration {
        chrono::Utc::now().signed_duration_since(self.0)
    }

    /// Compact, filename-safe form: `YYYYMMDD-HHMMSS`.
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d-%H%M%S").to_string()
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod mod_id {
        use super::*;

        #[test]
        fn valid() {
            assert!(ModId::new("abc-123_X").is_ok());
        }

        #[test]
        fn rejects_empty() {
            assert!(ModId::new("").is_err());
        }

        #[test]
        fn rejects_game_sentinel() {
            assert!(matches!(
                ModId::new("GAME"),
                Err(TypeError::InvalidModId(_))
            ));
        }

        #[test]
        fn rejects_path_separators() {
            assert!(ModId::new("a/b").is_err());
            assert!(ModId::new("a.b").is_err());
        }

        #[test]
        fn generate_is_stable_and_sensitive() {
            let a = ModId::generate("g", "Name", "1.0");
            let b = ModId::generate("g", "Name", "1.0");
            let c = ModId::generate("g", "Name", "1.1");
            let d = ModId::generate("h", "Name", "1.0");
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert_ne!(a, d);
            assert_eq!(a.as_str().len(), MOD_ID_LEN);
            assert!(ModId::new(a.as_str()).is_ok());
        }

        #[test]
        fn generate_separates_fields() {
            // "ab" + "c" must not collide with "a" + "bc"
            let a = ModId::generate("g", "ab", "c");
            let b = ModId::generate("g", "a", "bc");
            assert_ne!(a, b);
        }
    }

    mod owner_id {
        use super::*;

        #[test]
        fn game_roundtrip() {
            let json = serde_json::to_string(&OwnerId::Game).unwrap();
            assert_eq!(json, "\"GAME\"");
            let parsed: OwnerId = serde_json::from_str(&json).unwrap();
            assert!(parsed.is_game());
        }

        #[test]
        fn mod_roundtrip() {
            let owner = OwnerId::Mod(ModId::new("m1").unwrap());
            let json = serde_json::to_string(&owner).unwrap();
            assert_eq!(json, "\"m1\"");
            let parsed: OwnerId = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, owner);
            assert_eq!(parsed.as_mod().unwrap().as_str(), "m1");
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn game_is_lowest() {
            assert!(Priority::Game < Priority::Unranked);
            assert!(Priority::Game < Priority::Mod(0));
            assert!(Priority::Unranked < Priority::Mod(0));
            assert!(Priority::Mod(1) < Priority::Mod(2));
        }
    }

    mod content_hash {
        use super::*;

        #[test]
        fn normalizes_case() {
            let upper = "A".repeat(64);
            let hash = ContentHash::new(upper).unwrap();
            assert_eq!(hash.as_str(), "a".repeat(64));
        }

        #[test]
        fn rejects_bad_length() {
            assert!(ContentHash::new("abc").is_err());
        }

        #[test]
        fn rejects_non_hex() {
            assert!(ContentHash::new("z".repeat(64)).is_err());
        }
    }

    mod rel_path {
        use super::*;

        #[test]
        fn normalizes_separators() {
            let p = RelPath::new("a\\b//./c.txt").unwrap();
            assert_eq!(p.as_str(), "a/b/c.txt");
        }

        #[test]
        fn rejects_escape() {
            assert!(RelPath::new("a/../../b").is_err());
        }

        #[test]
        fn rejects_absolute() {
            assert!(RelPath::new("/etc/passwd").is_err());
            assert!(RelPath::new("C:/Windows").is_err());
        }

        #[test]
        fn rejects_empty() {
            assert!(RelPath::new("").is_err());
            assert!(RelPath::new("./").is_err());
        }

        #[test]
        fn under_with_suffix_appends_to_file_name() {
            let p = RelPath::new("textures/x.png").unwrap();
            let out = p.under_with_suffix(Path::new("/root/lineages"), ".json");
            assert_eq!(out, PathBuf::from("/root/lineages/textures/x.png.json"));
        }

        #[test]
        fn from_path_roundtrip() {
            let p = RelPath::from_path(Path::new("data/meshes/a.nif")).unwrap();
            assert_eq!(p.as_str(), "data/meshes/a.nif");
            assert_eq!(
                p.under(Path::new("/game")),
                PathBuf::from("/game/data/meshes/a.nif")
            );
        }
    }

    mod utc_timestamp {
        use super::*;

        #[test]
        fn now_works() {
            let ts = UtcTimestamp::now();
            assert!(ts.to_string().contains('T'));
        }

        #[test]
        fn serde_roundtrip() {
            let ts = UtcTimestamp::now();
            let json = serde_json::to_string(&ts).unwrap();
            let parsed: UtcTimestamp = serde_json::from_str(&json).unwrap();
            assert_eq!(ts, parsed);
        }

        #[test]
        fn age_of_old_timestamp() {
            let ts = UtcTimestamp::from_unix_secs(0).unwrap();
            assert!(ts.age().num_days() > 365);
        }

        #[test]
        fn compact_is_filename_safe() {
            let ts = UtcTimestamp::from_unix_secs(0).unwrap();
            assert_eq!(ts.compact(), "19700101-000000");
        }
    }
}
