//! core::ops::lock
//!
//! Exclusive lock over a game install directory.
//!
//! # Architecture
//!
//! Two layers guard every mutation of an install tree:
//!
//! 1. An in-process claim keyed by the canonical directory path. It is
//!    reentrant for the owning thread and rejects every other thread.
//! 2. A `.lock` sentinel file inside the directory, recording the owner's
//!    pid, thread, host and acquisition time. With the `os-lock` feature the
//!    sentinel is additionally held with an OS advisory lock via `fs2`.
//!
//! Acquisition never waits: it succeeds, fails with [`LockError::Busy`], or
//! clears an abandoned sentinel and retries once.
//!
//! # Storage
//!
//! - `<install_root>/.lock` - sentinel with `pid=`, `timestamp=`, `thread=`,
//!   `host=` lines
//!
//! # Invariants
//!
//! - A failed acquisition has no side effects
//! - Release order: delete sentinel, drop OS lock, drop in-process claim
//! - Release happens on drop, on every exit path
//!
//! # Example
//!
//! ```no_run
//! use modweave::core::ops::lock::{DirectoryLock, LockOptions};
//! use std::path::Path;
//!
//! let lock = DirectoryLock::acquire(Path::new("/games/skyrim"), &LockOptions::default())?;
//! assert!(lock.is_held());
//! // ... mutate the install tree ...
//! drop(lock);
//! # Ok::<(), modweave::core::ops::lock::LockError>(())
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::core::config::{Config, DEFAULT_STALE_AFTER_SECS};
use crate::core::paths::LOCK_FILE_NAME;
use crate::core::types::UtcTimestamp;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another thread or process holds the lock.
    #[error("'{}' is locked by {holder}", path.display())]
    Busy { path: PathBuf, holder: String },

    /// I/O error while preparing or writing the sentinel.
    #[error("lock i/o error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Tunables for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Age after which a sentinel is treated as abandoned.
    pub stale_after: Duration,
    /// Take the OS advisory lock too. Ignored without the `os-lock` feature.
    pub os_lock: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            os_lock: true,
        }
    }
}

impl LockOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_after: config.stale_after(),
            os_lock: config.os_lock(),
        }
    }
}

// =============================================================================
// In-process claims
// =============================================================================

#[derive(Debug)]
struct Holder {
    thread: ThreadId,
    depth: usize,
}

static HOLDERS: Mutex<BTreeMap<PathBuf, Holder>> = parking_lot::const_mutex(BTreeMap::new());

enum Claim {
    /// First claim by this thread; the caller must take the sentinel.
    Fresh,
    /// This thread already holds the directory.
    Nested,
}

fn claim_in_process(dir: &Path) -> Result<Claim, LockError> {
    let me = thread::current().id();
    let mut holders = HOLDERS.lock();
    match holders.get_mut(dir) {
        Some(holder) if holder.thread == me => {
            holder.depth += 1;
            Ok(Claim::Nested)
        }
        Some(holder) => Err(LockError::Busy {
            path: dir.to_path_buf(),
            holder: format!("another thread of this process ({:?})", holder.thread),
        }),
        None => {
            holders.insert(
                dir.to_path_buf(),
                Holder {
                    thread: me,
                    depth: 1,
                },
            );
            Ok(Claim::Fresh)
        }
    }
}

/// Drop one level of the claim. Returns `true` when the claim is gone.
fn release_in_process(dir: &Path) -> bool {
    let mut holders = HOLDERS.lock();
    match holders.get_mut(dir) {
        Some(holder) if holder.depth > 1 => {
            holder.depth -= 1;
            false
        }
        Some(_) => {
            holders.remove(dir);
            true
        }
        None => true,
    }
}

// =============================================================================
// Sentinel
// =============================================================================

/// Owner information recorded in the sentinel file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelInfo {
    pub pid: u32,
    pub timestamp: UtcTimestamp,
    pub thread: String,
    pub host: String,
}

impl SentinelInfo {
    /// Describe the calling thread.
    pub fn current() -> Self {
        let current = thread::current();
        let thread = match current.name() {
            Some(name) => format!("{} {:?}", name, current.id()),
            None => format!("{:?}", current.id()),
        };
        Self {
            pid: std::process::id(),
            timestamp: UtcTimestamp::now(),
            thread,
            host: local_host(),
        }
    }

    /// Parse sentinel contents. `None` if the pid or timestamp is missing.
    pub fn parse(contents: &str) -> Option<Self> {
        let mut pid = None;
        let mut timestamp = None;
        let mut thread = String::new();
        let mut host = String::new();
        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "pid" => pid = value.parse::<u32>().ok(),
                "timestamp" => {
                    timestamp = chrono::DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|dt| UtcTimestamp::from_datetime(dt.with_timezone(&chrono::Utc)))
                }
                "thread" => thread = value.to_string(),
                "host" => host = value.to_string(),
                _ => {}
            }
        }
        Some(Self {
            pid: pid?,
            timestamp: timestamp?,
            thread,
            host,
        })
    }

    pub fn render(&self) -> String {
        format!(
            "pid={}\ntimestamp={}\nthread={}\nhost={}\n",
            self.pid, self.timestamp, self.thread, self.host
        )
    }

    /// Whether the recorded owner can be considered gone.
    ///
    /// A sentinel is stale when it is older than `stale_after`, or when it
    /// was written on this host by a process that no longer runs.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        let too_old = self
            .timestamp
            .age()
            .to_std()
            .map(|age| age > stale_after)
            .unwrap_or(false);
        too_old || (self.host == local_host() && !pid_alive(self.pid))
    }

    fn describe(&self) -> String {
        format!(
            "pid {} ({}) on '{}' since {}",
            self.pid, self.thread, self.host, self.timestamp
        )
    }
}

fn local_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 performs the permission and existence checks only.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Outcome of inspecting an existing sentinel.
enum Existing {
    Free,
    Stale(String),
    Held(String),
}

fn inspect_sentinel(path: &Path, stale_after: Duration) -> Result<Existing, LockError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Existing::Free),
        Err(e) => return Err(LockError::io(path, e)),
    };
    if contents.trim().is_empty() {
        return Ok(Existing::Free);
    }
    match SentinelInfo::parse(&contents) {
        Some(info) if info.is_stale(stale_after) => Ok(Existing::Stale(info.describe())),
        Some(info) => Ok(Existing::Held(info.describe())),
        None => {
            // Unparseable: possibly mid-write by its owner. Fall back to mtime.
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok());
            match age {
                Some(age) if age > stale_after => Ok(Existing::Stale("unreadable sentinel".into())),
                _ => Ok(Existing::Held("an unknown owner".into())),
            }
        }
    }
}

fn write_sentinel(file: &mut File, path: &Path) -> Result<(), LockError> {
    file.set_len(0).map_err(|e| LockError::io(path, e))?;
    file.write_all(SentinelInfo::current().render().as_bytes())
        .map_err(|e| LockError::io(path, e))?;
    file.sync_all().map_err(|e| LockError::io(path, e))
}

fn remove_sentinel(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Create the sentinel exclusively, clearing an abandoned one at most once.
fn claim_sentinel(path: &Path, options: &LockOptions) -> Result<File, LockError> {
    for attempt in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                write_sentinel(&mut file, path)?;
                return Ok(file);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match inspect_sentinel(path, options.stale_after)? {
                    Existing::Held(holder) => {
                        return Err(LockError::Busy {
                            path: path.to_path_buf(),
                            holder,
                        })
                    }
                    Existing::Stale(holder) if attempt == 0 => {
                        tracing::warn!(path = %path.display(), %holder, "clearing abandoned lock sentinel");
                        remove_sentinel(path)?;
                    }
                    Existing::Free if attempt == 0 => {
                        remove_sentinel(path)?;
                    }
                    Existing::Stale(holder) => {
                        return Err(LockError::Busy {
                            path: path.to_path_buf(),
                            holder,
                        })
                    }
                    Existing::Free => {
                        return Err(LockError::Busy {
                            path: path.to_path_buf(),
                            holder: "a concurrent acquirer".into(),
                        })
                    }
                }
            }
            Err(e) => return Err(LockError::io(path, e)),
        }
    }
    Err(LockError::Busy {
        path: path.to_path_buf(),
        holder: "a concurrent acquirer".into(),
    })
}

/// Take the OS advisory lock on the sentinel, then record ourselves in it.
#[cfg(feature = "os-lock")]
fn claim_os_locked(path: &Path, options: &LockOptions) -> Result<File, LockError> {
    use fs2::FileExt;

    for _ in 0..2 {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::io(path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                let holder = match inspect_sentinel(path, options.stale_after)? {
                    Existing::Held(h) | Existing::Stale(h) => h,
                    Existing::Free => "another process".into(),
                };
                return Err(LockError::Busy {
                    path: path.to_path_buf(),
                    holder,
                });
            }
            Err(e) => return Err(LockError::io(path, e)),
        }

        // The previous owner may have unlinked the file between our open and
        // our lock; then we hold a lock on an orphaned inode.
        if !same_file(&file, path) {
            let _ = file.unlock();
            continue;
        }

        match inspect_sentinel(path, options.stale_after)? {
            Existing::Free => {}
            Existing::Stale(holder) => {
                tracing::warn!(path = %path.display(), %holder, "clearing abandoned lock sentinel");
            }
            Existing::Held(holder) => {
                let _ = file.unlock();
                return Err(LockError::Busy {
                    path: path.to_path_buf(),
                    holder,
                });
            }
        }

        write_sentinel(&mut file, path)?;
        return Ok(file);
    }
    Err(LockError::Busy {
        path: path.to_path_buf(),
        holder: "a concurrent acquirer".into(),
    })
}

#[cfg(all(feature = "os-lock", unix))]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(all(feature = "os-lock", not(unix)))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

// =============================================================================
// DirectoryLock
// =============================================================================

/// An exclusive lock on a directory tree.
///
/// Released automatically when dropped. Nested acquisitions by the owning
/// thread succeed and only the outermost guard touches the sentinel.
#[derive(Debug)]
pub struct DirectoryLock {
    /// Canonical path of the locked directory.
    dir: PathBuf,
    /// Sentinel path, set only on the outermost guard.
    sentinel: Option<PathBuf>,
    /// Open sentinel handle (holds the OS lock when enabled).
    file: Option<File>,
    held: bool,
}

impl DirectoryLock {
    /// Acquire the lock on `dir`, which must already exist.
    ///
    /// # Errors
    ///
    /// - [`LockError::Busy`] if another thread or live process holds it
    /// - [`LockError::Io`] if the directory is missing or the sentinel cannot
    ///   be prepared
    pub fn acquire(dir: &Path, options: &LockOptions) -> Result<Self, LockError> {
        let dir = dir.canonicalize().map_err(|e| LockError::io(dir, e))?;

        match claim_in_process(&dir)? {
            Claim::Nested => {
                tracing::debug!(dir = %dir.display(), "reentrant lock acquisition");
                return Ok(Self {
                    dir,
                    sentinel: None,
                    file: None,
                    held: true,
                });
            }
            Claim::Fresh => {}
        }

        let sentinel = dir.join(LOCK_FILE_NAME);
        match Self::claim(&sentinel, options) {
            Ok(file) => {
                tracing::debug!(dir = %dir.display(), "lock acquired");
                Ok(Self {
                    dir,
                    sentinel: Some(sentinel),
                    file: Some(file),
                    held: true,
                })
            }
            Err(e) => {
                release_in_process(&dir);
                Err(e)
            }
        }
    }

    /// Try to acquire the lock, returning `None` if it is busy or cannot be
    /// taken. A `None` result had no side effects.
    pub fn try_acquire(dir: &Path, options: &LockOptions) -> Option<Self> {
        match Self::acquire(dir, options) {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "lock not acquired");
                None
            }
        }
    }

    #[cfg(feature = "os-lock")]
    fn claim(sentinel: &Path, options: &LockOptions) -> Result<File, LockError> {
        if options.os_lock {
            claim_os_locked(sentinel, options)
        } else {
            claim_sentinel(sentinel, options)
        }
    }

    #[cfg(not(feature = "os-lock"))]
    fn claim(sentinel: &Path, options: &LockOptions) -> Result<File, LockError> {
        claim_sentinel(sentinel, options)
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Canonical path of the locked directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Release the lock explicitly.
    pub fn release(&mut self) -> Result<(), LockError> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        let mut result = Ok(());
        if let Some(sentinel) = self.sentinel.take() {
            match fs::remove_file(&sentinel) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => result = Err(LockError::io(&sentinel, e)),
            }
        }
        if let Some(file) = self.file.take() {
            #[cfg(feature = "os-lock")]
            {
                let _ = fs2::FileExt::unlock(&file);
            }
            drop(file);
        }
        if release_in_process(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), "lock released");
        }
        result
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release directory lock cleanly");
        }
    }
}
