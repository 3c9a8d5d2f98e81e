//! core::ops
//!
//! Locking and merge journaling.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive lock over a game install directory
//! - [`journal`] - Journal for staging → live tree merges
//!
//! # Architecture
//!
//! Every mutating engine operation:
//! 1. Acquires the install's DirectoryLock
//! 2. Builds its changes in a staging tree
//! 3. Writes a merge journal before touching the live tree
//! 4. Merges, commits the journal, and removes journal and staging
//! 5. On merge failure keeps both for `recover`

pub mod journal;
pub mod lock;

pub use journal::{EntryState, JournalError, MergeEntry, MergeJournal, MergePhase, OpId};
pub use lock::{DirectoryLock, LockError, LockOptions, SentinelInfo};
