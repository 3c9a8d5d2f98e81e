//! core
//!
//! Core domain types, persisted schemas, and low-level operations.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ModId, OwnerId, ContentHash, RelPath, etc.
//! - [`hash`] - Content hashing of files
//! - [`lineage`] - Per-path ownership stacks
//! - [`manifest`] - Mod manifests and metadata
//! - [`registry`] - Deployed mods and load order
//! - [`paths`] - Centralized path routing for install and storage trees
//! - [`game`] - Externally resolved game reference
//! - [`store`] - JSON document persistence
//! - [`fsops`] - File copy, move, and pruning helpers
//! - [`ops`] - DirectoryLock and merge journal
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - "Not there" is a value, not an error

pub mod config;
pub mod fsops;
pub mod game;
pub mod hash;
pub mod lineage;
pub mod manifest;
pub mod ops;
pub mod paths;
pub mod registry;
pub mod store;
pub mod types;
