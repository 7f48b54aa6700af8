//! Install-time population of a fresh namespace.
//!
//! Required assets form one all-or-nothing batch: they are fetched
//! concurrently, and only if every one of them is usable is the batch written
//! in a single transaction. Optional assets are fetched `no-cors` and stored
//! one by one; a failure is logged and skipped.

use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use precache_core::{
    AssetManifest, Error, Fetcher, Method, Namespace, NamespaceStore, NamespaceTag, PopulationMode, Request,
    RequestMode, Response, StoredEntry,
};
use url::Url;

/// An optional asset that could not be populated.
#[derive(Debug, Clone)]
pub struct OptionalFailure {
    pub url: Url,
    pub reason: String,
}

/// Result of a successful population.
#[derive(Debug, Clone)]
pub struct PopulationReport {
    pub tag: NamespaceTag,
    pub required: usize,
    pub optional_stored: usize,
    pub optional_failed: Vec<OptionalFailure>,
}

/// Fills a namespace from an asset manifest.
#[derive(Clone)]
pub struct Populator {
    store: Arc<dyn NamespaceStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl Populator {
    pub fn new(store: Arc<dyn NamespaceStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Populate the namespace for `tag`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PopulationFailed` if the namespace cannot be opened or
    /// any required asset cannot be fetched and stored. Nothing from the
    /// required batch is written in that case.
    pub async fn populate(&self, tag: &NamespaceTag, manifest: &AssetManifest) -> Result<PopulationReport, Error> {
        let namespace = self
            .store
            .open(tag)
            .await
            .map_err(|e| Error::PopulationFailed { asset: format!("namespace {tag}"), reason: e.to_string() })?;

        let mut report =
            PopulationReport { tag: tag.clone(), required: 0, optional_stored: 0, optional_failed: Vec::new() };

        for (mode, urls) in manifest.batches() {
            match mode {
                PopulationMode::Strict => report.required = self.populate_strict(&namespace, urls).await?,
                PopulationMode::BestEffort => self.populate_best_effort(&namespace, urls, &mut report).await,
            }
        }

        tracing::info!(
            tag = %tag,
            required = report.required,
            optional_stored = report.optional_stored,
            optional_failed = report.optional_failed.len(),
            "namespace populated"
        );

        Ok(report)
    }

    async fn populate_strict(&self, namespace: &Namespace, urls: &[Url]) -> Result<usize, Error> {
        let mode = PopulationMode::Strict.request_mode();
        let responses = try_join_all(urls.iter().map(|url| async move {
            self.fetch_asset(url, mode)
                .await
                .map_err(|e| Error::PopulationFailed { asset: url.to_string(), reason: e.to_string() })
        }))
        .await?;

        let entries = responses
            .into_iter()
            .map(|response| StoredEntry::from_response(&Method::GET, response))
            .collect::<Result<Vec<_>, _>>()?;
        let count = entries.len();

        self.store.put_all(namespace, entries).await.map_err(|e| Error::PopulationFailed {
            asset: format!("namespace {}", namespace.tag()),
            reason: format!("batch write failed: {e}"),
        })?;

        Ok(count)
    }

    async fn populate_best_effort(&self, namespace: &Namespace, urls: &[Url], report: &mut PopulationReport) {
        let mode = PopulationMode::BestEffort.request_mode();
        let results = join_all(urls.iter().map(|url| self.populate_one(namespace, url, mode))).await;

        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(()) => report.optional_stored += 1,
                Err(e) => {
                    tracing::warn!(tag = %namespace.tag(), url = %url, error = %e, "optional asset skipped");
                    report.optional_failed.push(OptionalFailure { url: url.clone(), reason: e.to_string() });
                }
            }
        }
    }

    async fn populate_one(&self, namespace: &Namespace, url: &Url, mode: RequestMode) -> Result<(), Error> {
        let response = self.fetch_asset(url, mode).await?;
        let entry = StoredEntry::from_response(&Method::GET, response)?;
        self.store.put(namespace, entry).await
    }

    /// Fetch one asset and reject responses the storage policy would not keep.
    ///
    /// Opaque responses always pass: their status cannot be read.
    async fn fetch_asset(&self, url: &Url, mode: RequestMode) -> Result<Response, Error> {
        let request = Request::get(url.clone()).with_mode(mode);
        let response = self.fetcher.fetch(&request).await?;

        if !response.is_cacheable() {
            let status = response.status().map(|s| s.to_string()).unwrap_or_default();
            return Err(Error::HttpError(format!("status {status}")));
        }

        Ok(response)
    }
}
