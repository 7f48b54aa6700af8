//! SQLite-backed namespace store for cached responses.
//!
//! This module provides the persistent, versioned response store using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - One namespace per engine build, addressed by tag
//! - Entries keyed by SHA-256 of (method, URL)
//! - Atomic batch writes for all-or-nothing population
//! - Whole-namespace deletion (no per-entry eviction)

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod namespaces;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::StoredEntry;
pub use namespaces::Namespace;
pub use store::NamespaceStore;
