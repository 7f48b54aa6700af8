//! Network client for precache.
//!
//! This crate provides the host network capability: an HTTP [`Fetcher`]
//! that classifies cross-origin `no-cors` responses as opaque.
//!
//! [`Fetcher`]: precache_core::Fetcher

pub mod fetch;

pub use fetch::{FetchConfig, HttpFetcher};
