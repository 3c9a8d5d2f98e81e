//! Modweave - layered mod deployment with per-file ownership lineage
//!
//! Modweave installs game mods into a live install tree while remembering,
//! for every managed path, the stack of owners that have claimed it. When
//! two mods ship the same file the one with the higher load order wins;
//! disabling it restores whichever owner is next in line, down to the
//! original game bytes.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - The DeploymentEngine: compile, deploy, disable, reconcile
//! - [`core`] - Domain types, persistence, locking and journaling
//!
//! # Correctness Invariants
//!
//! Modweave maintains the following invariants:
//!
//! 1. The top of every lineage matches the live file at that path by hash
//! 2. Every mutation of an install happens under its DirectoryLock
//! 3. Deploys never write into the live tree outside a journaled merge
//! 4. The Registry is updated only after the file changes it describes

pub mod cli;
pub mod core;
pub mod engine;
