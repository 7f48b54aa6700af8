//! Network capability consumed by the engine.

use async_trait::async_trait;

use crate::{Error, Request, Response};

/// "Fetch a URL" as provided by the host runtime.
///
/// Implementations report transport failures as errors and return every
/// HTTP status as a response; deciding what is usable is the caller's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}
