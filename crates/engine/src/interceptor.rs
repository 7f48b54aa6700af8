//! Per-request interception against the current namespace.
//!
//! Non-GET requests go straight to the network and never touch the store.
//! GET requests follow the configured [`Strategy`]:
//!
//! - `CacheFirst`: a hit is returned with no network call; a miss is fetched,
//!   returned, and written back in the background.
//! - `StaleWhileRevalidate`: the network fetch starts before the lookup; a hit
//!   is returned at once while the fresh response replaces it in the
//!   background, and a miss waits for the network.
//!
//! Only 200 and opaque responses are written back. Writes are best-effort
//! tail work: a failed write is logged and never reaches the caller.

use std::sync::Arc;

use precache_core::{
    Error, Fetcher, Method, Namespace, NamespaceStore, Request, RequestMode, Response, StoredEntry, Strategy,
};
use tokio::task::JoinHandle;
use url::Url;

/// Where a response handed to the application came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Non-GET request, or no active namespace.
    Passthrough,
    /// Offline fallback page served for a failed navigation.
    Fallback,
}

/// Work that outlives the response, such as a cache write.
///
/// The host keeps the event open until this settles. Settling never fails.
#[derive(Debug, Default)]
pub struct BackgroundWork(Option<JoinHandle<()>>);

impl BackgroundWork {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_pending(&self) -> bool {
        self.0.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the tail work to finish.
    pub async fn settled(self) {
        if let Some(handle) = self.0
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "background cache work aborted");
        }
    }
}

/// Response for one intercepted request.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
    pub background: BackgroundWork,
}

impl FetchOutcome {
    pub fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source, background: BackgroundWork::none() }
    }

    fn with_background(mut self, background: BackgroundWork) -> Self {
        self.background = background;
        self
    }
}

/// Answers requests for one namespace.
#[derive(Clone)]
pub struct Interceptor {
    namespace: Namespace,
    store: Arc<dyn NamespaceStore>,
    fetcher: Arc<dyn Fetcher>,
    strategy: Strategy,
    offline_fallback: Option<Url>,
}

impl Interceptor {
    pub fn new(
        namespace: Namespace, store: Arc<dyn NamespaceStore>, fetcher: Arc<dyn Fetcher>, strategy: Strategy,
    ) -> Self {
        Self { namespace, store, fetcher, strategy, offline_fallback: None }
    }

    /// Serve `fallback` (a cached page) to navigations that fail offline.
    pub fn with_offline_fallback(mut self, fallback: Option<Url>) -> Self {
        self.offline_fallback = fallback;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Answer one request.
    ///
    /// # Errors
    ///
    /// Returns the network error when the request is not GET, or when a GET
    /// misses the namespace and the network fails with no fallback to serve.
    pub async fn intercept(&self, mut request: Request) -> Result<FetchOutcome, Error> {
        if !request.is_get() {
            tracing::debug!(method = %request.method, url = %request.url, "passing through non-GET request");
            let response = self.fetcher.fetch(&request).await?;
            return Ok(FetchOutcome::new(response, ResponseSource::Passthrough));
        }

        request.url.set_fragment(None);

        match self.strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    async fn cache_first(&self, request: Request) -> Result<FetchOutcome, Error> {
        if let Some(entry) = self.lookup(&request).await {
            tracing::debug!(tag = %self.namespace.tag(), url = %request.url, "cache hit");
            return Ok(FetchOutcome::new(entry.into_response(), ResponseSource::Cache));
        }

        tracing::debug!(tag = %self.namespace.tag(), url = %request.url, "cache miss");
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                let (response, background) = self.store_in_background(&request.method, response);
                Ok(FetchOutcome::new(response, ResponseSource::Network).with_background(background))
            }
            Err(e) => self.recover(&request, e).await,
        }
    }

    async fn stale_while_revalidate(&self, request: Request) -> Result<FetchOutcome, Error> {
        let network = {
            let fetcher = Arc::clone(&self.fetcher);
            let request = request.clone();
            tokio::spawn(async move { fetcher.fetch(&request).await })
        };

        if let Some(entry) = self.lookup(&request).await {
            tracing::debug!(tag = %self.namespace.tag(), url = %request.url, "cache hit, revalidating");
            let store = Arc::clone(&self.store);
            let namespace = self.namespace.clone();
            let method = request.method.clone();
            let url = request.url.clone();
            let revalidate = tokio::spawn(async move {
                match network.await {
                    Ok(Ok(response)) if response.is_cacheable() => persist(store, namespace, method, response).await,
                    Ok(Ok(response)) => {
                        tracing::debug!(url = %url, status = ?response.status(), "revalidation not stored")
                    }
                    Ok(Err(e)) => tracing::debug!(url = %url, error = %e, "revalidation failed; keeping cached entry"),
                    Err(e) => tracing::warn!(url = %url, error = %e, "revalidation task aborted"),
                }
            });
            return Ok(FetchOutcome::new(entry.into_response(), ResponseSource::Cache)
                .with_background(BackgroundWork(Some(revalidate))));
        }

        tracing::debug!(tag = %self.namespace.tag(), url = %request.url, "cache miss");
        let fetched = match network.await {
            Ok(result) => result,
            Err(e) => Err(Error::Network(format!("{}: fetch task aborted: {e}", request.url))),
        };
        match fetched {
            Ok(response) => {
                let (response, background) = self.store_in_background(&request.method, response);
                Ok(FetchOutcome::new(response, ResponseSource::Network).with_background(background))
            }
            Err(e) => self.recover(&request, e).await,
        }
    }

    /// Read from the namespace; a failed read counts as a miss.
    async fn lookup(&self, request: &Request) -> Option<StoredEntry> {
        match self.store.get(&self.namespace, &request.method, &request.url).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(tag = %self.namespace.tag(), url = %request.url, error = %e, "namespace read failed");
                None
            }
        }
    }

    /// Split off a copy for the store and write it after the response is out.
    fn store_in_background(&self, method: &Method, response: Response) -> (Response, BackgroundWork) {
        if !response.is_cacheable() {
            tracing::debug!(url = %response.url(), status = ?response.status(), "response not stored");
            return (response, BackgroundWork::none());
        }

        let (returned, persisted) = response.duplicate();
        let handle =
            tokio::spawn(persist(Arc::clone(&self.store), self.namespace.clone(), method.clone(), persisted));
        (returned, BackgroundWork(Some(handle)))
    }

    async fn recover(&self, request: &Request, error: Error) -> Result<FetchOutcome, Error> {
        if request.mode == RequestMode::Navigate
            && let Some(fallback) = &self.offline_fallback
            && let Ok(Some(entry)) = self.store.get(&self.namespace, &Method::GET, fallback).await
        {
            tracing::info!(url = %request.url, fallback = %fallback, error = %error, "serving offline fallback");
            return Ok(FetchOutcome::new(entry.into_response(), ResponseSource::Fallback));
        }

        Err(error)
    }
}

async fn persist(store: Arc<dyn NamespaceStore>, namespace: Namespace, method: Method, response: Response) {
    let url = response.url().clone();
    let entry = match StoredEntry::from_response(&method, response) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "response not storable");
            return;
        }
    };

    match store.put(&namespace, entry).await {
        Ok(()) => tracing::debug!(tag = %namespace.tag(), url = %url, "stored response"),
        Err(e) => tracing::warn!(tag = %namespace.tag(), url = %url, error = %e, "failed to persist response"),
    }
}
