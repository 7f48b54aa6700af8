//! Responses with single-consumption bodies.
//!
//! A [`Response`] is not `Clone`: reading its body consumes it. Anything that
//! needs to both return and persist a response calls [`Response::duplicate`]
//! first, which yields two independently readable copies.

use bytes::Bytes;
use url::Url;

use crate::Error;

/// Response header list, in transport order.
pub type Headers = Vec<(String, String)>;

/// Whether the engine may inspect a response.
///
/// Cross-origin `no-cors` responses are `Opaque`: their status and headers
/// are withheld, so there is nothing to branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Basic { status: u16, headers: Headers },
    Opaque,
}

impl ResponseKind {
    /// Storage label used by the SQLite schema.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseKind::Basic { .. } => "basic",
            ResponseKind::Opaque => "opaque",
        }
    }
}

/// A response body that can be read exactly once.
#[derive(Debug)]
pub struct Body {
    bytes: Bytes,
}

impl Body {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the body.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Consume the body as UTF-8 text.
    pub fn text(self) -> Result<String, Error> {
        String::from_utf8(self.bytes.to_vec()).map_err(|e| Error::InvalidInput(format!("body is not UTF-8: {e}")))
    }
}

/// A network or cached response.
#[derive(Debug)]
pub struct Response {
    url: Url,
    kind: ResponseKind,
    body: Body,
}

impl Response {
    pub fn basic(url: Url, status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self { url, kind: ResponseKind::Basic { status, headers }, body: Body::new(body) }
    }

    pub fn opaque(url: Url, body: impl Into<Bytes>) -> Self {
        Self { url, kind: ResponseKind::Opaque, body: Body::new(body) }
    }

    pub(crate) fn from_parts(url: Url, kind: ResponseKind, body: Body) -> Self {
        Self { url, kind, body }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> &ResponseKind {
        &self.kind
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.kind, ResponseKind::Opaque)
    }

    /// Status code, or `None` for opaque responses.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ResponseKind::Basic { status, .. } => Some(*status),
            ResponseKind::Opaque => None,
        }
    }

    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        match &self.kind {
            ResponseKind::Basic { headers, .. } => headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            ResponseKind::Opaque => None,
        }
    }

    /// Storage policy: only 200 and opaque responses are ever persisted.
    pub fn is_cacheable(&self) -> bool {
        match &self.kind {
            ResponseKind::Basic { status, .. } => *status == 200,
            ResponseKind::Opaque => true,
        }
    }

    /// Split into two independently consumable copies.
    pub fn duplicate(self) -> (Response, Response) {
        let bytes = self.body.into_bytes();
        let copy = Response { url: self.url.clone(), kind: self.kind.clone(), body: Body::new(bytes.clone()) };
        (Response { url: self.url, kind: self.kind, body: Body::new(bytes) }, copy)
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn into_parts(self) -> (Url, ResponseKind, Body) {
        (self.url, self.kind, self.body)
    }
}
