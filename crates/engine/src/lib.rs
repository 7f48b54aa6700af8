//! Versioned offline cache engine for precache.
//!
//! This crate provides:
//! - Install-time population of a namespace from an asset manifest
//! - Activation-time collection of stale namespaces
//! - Per-request interception (cache-first or stale-while-revalidate)
//! - The worker lifecycle and consumer claiming

pub mod collector;
pub mod consumers;
pub mod interceptor;
pub mod lifecycle;
pub mod populator;

#[cfg(test)]
mod test_support;

pub use collector::{CollectionReport, GarbageCollector};
pub use consumers::{Consumer, Consumers};
pub use interceptor::{BackgroundWork, FetchOutcome, Interceptor, ResponseSource};
pub use lifecycle::{EngineOptions, InstallOutcome, Registration, Worker, WorkerState};
pub use populator::{OptionalFailure, PopulationReport, Populator};
