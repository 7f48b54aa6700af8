//! Outbound requests as seen by the interceptor.

use http::Method;
use url::Url;

/// How the host issued a request.
///
/// Mirrors the transport's cross-origin classification: `NoCors` requests to
/// another origin come back as opaque responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Must stay on the application origin.
    SameOrigin,
    /// Default mode; cross-origin reads are allowed and inspectable.
    #[default]
    Cors,
    /// Cross-origin reads are allowed but produce opaque responses.
    NoCors,
    /// Top-level document navigation.
    Navigate,
}

/// A request intercepted from the application.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, mode: RequestMode::default(), headers: Vec::new() }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Only GET requests ever touch the namespace store.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}
