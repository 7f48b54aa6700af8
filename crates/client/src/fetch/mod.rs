//! HTTP fetch pipeline with origin classification.
//!
//! ### Origin handling
//! - `same-origin` requests to another origin are refused before any I/O.
//! - `no-cors` requests to another origin yield opaque responses: the body
//!   is kept, status and headers are dropped.
//! - Everything else yields a basic response carrying status and headers,
//!   whatever the status.
//!
//! ### Transport limits
//! - Max redirects: 5
//! - Max body bytes: 10MB (configurable)
//! - Request timeout: 30s (configurable)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, header};
use url::Url;

use precache_core::url::same_origin;
use precache_core::{AppConfig, ConfigError, Error, Fetcher, Headers, Request, RequestMode, Response};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Application origin used to classify requests
    pub origin: Url,

    /// User agent string (default: "precache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 30s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl FetchConfig {
    /// Default transport limits for the given origin.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            user_agent: "precache/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(30_000),
            max_redirects: 5,
        }
    }

    /// Derive transport settings from the engine build configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Self::new(config.origin_url()?)
        })
    }
}

/// HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }
        Ok(())
    }

    /// Read the body chunk by chunk, stopping as soon as it exceeds
    /// `max_bytes` (bodies without a `Content-Length` included).
    async fn read_body(&self, url: &Url, response: &mut reqwest::Response) -> Result<Bytes, Error> {
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| transport_error(url, e))? {
            self.check_size(body.len() + chunk.len())?;
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn transport_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = request.url.clone();
        let cross_origin = !same_origin(&url, &self.config.origin);

        if cross_origin && request.mode == RequestMode::SameOrigin {
            return Err(Error::InvalidUrl(format!("{url} is not on origin {}", self.config.origin)));
        }

        let mut builder = self.http.request(request.method.clone(), url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send().await.map_err(|e| transport_error(&url, e))?;

        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let bytes = self.read_body(&url, &mut response).await?;

        let fetch_ms = start.elapsed().as_millis() as u64;
        let opaque = cross_origin && request.mode == RequestMode::NoCors;

        tracing::debug!(
            method = %request.method,
            url = %url,
            status,
            opaque,
            bytes = bytes.len(),
            fetch_ms,
            "fetched"
        );

        if opaque {
            return Ok(Response::opaque(url, bytes));
        }

        let headers = headers
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(header::SET_COOKIE.as_str()))
            .collect();

        Ok(Response::basic(url, status, headers, bytes))
    }
}
