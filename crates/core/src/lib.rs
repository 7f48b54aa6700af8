//! Core types and shared functionality for precache.
//!
//! This crate provides:
//! - The request/response model, including opaque responses
//! - Namespace store implementation with SQLite backend
//! - The network capability trait
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod request;
pub mod response;
pub mod tag;
pub mod url;

pub use cache::{CacheDb, Namespace, NamespaceStore, StoredEntry};
pub use config::{AppConfig, ConfigError, Strategy};
pub use error::Error;
pub use fetcher::Fetcher;
pub use manifest::{AssetManifest, PopulationMode};
pub use request::{Request, RequestMode};
pub use response::{Body, Headers, Response, ResponseKind};
pub use tag::NamespaceTag;

pub use http::Method;
