//! Unified error types for precache.
//!
//! Display strings carry a stable upper-case code so hosts can match on the
//! failure class without depending on the enum layout.

use tokio_rusqlite::rusqlite;

/// Unified error types for the caching engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty tag, non-GET entry).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unresolvable URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Asset manifest is malformed (e.g., overlapping lists).
    #[error("INVALID_MANIFEST: {0}")]
    InvalidManifest(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored row could not be decoded back into an entry.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Transport-level failure reaching the network.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Response status unusable for caching (e.g., 404 for a required asset).
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// A required asset could not be populated; the version must not activate.
    #[error("POPULATION_FAILED: {asset}: {reason}")]
    PopulationFailed { asset: String, reason: String },

    /// Lifecycle transition not permitted from the current state.
    #[error("INVALID_TRANSITION: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Activation was requested with no populated version waiting.
    #[error("NO_WAITING_WORKER")]
    NoWaitingWorker,
}

impl Error {
    /// Whether this error must be surfaced to the lifecycle controller.
    ///
    /// Every other failure class is contained where it happens.
    pub fn is_population_failure(&self) -> bool {
        matches!(self, Error::PopulationFailed { .. })
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
