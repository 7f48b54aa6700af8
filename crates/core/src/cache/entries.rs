//! Stored entry CRUD operations.
//!
//! Entries are keyed by (namespace, method, URL). Writes use upsert
//! semantics, so concurrent writers to the same key resolve as last write
//! wins.

use chrono::{DateTime, Utc};
use http::Method;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheDb;
use super::hash::compute_entry_key;
use super::namespaces::Namespace;
use crate::response::Body;
use crate::{Error, Headers, Response, ResponseKind};

/// One cached response.
///
/// Only GET responses can become entries; [`StoredEntry::from_response`]
/// refuses anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    method: Method,
    url: Url,
    kind: ResponseKind,
    body: bytes::Bytes,
    stored_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Capture a response for storage, consuming its body.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for any method other than GET.
    pub fn from_response(method: &Method, response: Response) -> Result<Self, Error> {
        if *method != Method::GET {
            return Err(Error::InvalidInput(format!("refusing to store {method} response")));
        }

        let (url, kind, body) = response.into_parts();
        Ok(Self { method: method.clone(), url, kind, body: body.into_bytes(), stored_at: Utc::now() })
    }

    /// Rehydrate the stored response.
    pub fn into_response(self) -> Response {
        Response::from_parts(self.url, self.kind, Body::new(self.body))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> &ResponseKind {
        &self.kind
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    pub fn key(&self) -> String {
        compute_entry_key(self.method.as_str(), self.url.as_str())
    }
}

/// Flattened row ready to cross into the connection thread.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    kind: &'static str,
    status: Option<i64>,
    headers_json: Option<String>,
    body: Vec<u8>,
    stored_at: String,
}

impl EntryRow {
    fn from_entry(entry: &StoredEntry) -> Result<Self, Error> {
        let (status, headers_json) = match &entry.kind {
            ResponseKind::Basic { status, headers } => {
                let json = serde_json::to_string(headers)
                    .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;
                (Some(i64::from(*status)), Some(json))
            }
            ResponseKind::Opaque => (None, None),
        };

        Ok(Self {
            key_hash: entry.key(),
            method: entry.method.as_str().to_string(),
            url: entry.url.as_str().to_string(),
            kind: entry.kind.label(),
            status,
            headers_json,
            body: entry.body.to_vec(),
            stored_at: entry.stored_at.to_rfc3339(),
        })
    }

    fn insert(&self, conn: &rusqlite::Connection, namespace: &str) -> Result<(), Error> {
        conn.execute(
            "INSERT INTO entries (
                namespace, key_hash, method, url, kind, status, headers_json, body, stored_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(namespace, key_hash) DO UPDATE SET
                method = excluded.method,
                url = excluded.url,
                kind = excluded.kind,
                status = excluded.status,
                headers_json = excluded.headers_json,
                body = excluded.body,
                stored_at = excluded.stored_at",
            params![
                namespace,
                &self.key_hash,
                &self.method,
                &self.url,
                self.kind,
                &self.status,
                &self.headers_json,
                &self.body,
                &self.stored_at,
            ],
        )?;
        Ok(())
    }
}

fn decode_row(
    method: String, url: String, kind: String, status: Option<i64>, headers_json: Option<String>, body: Vec<u8>,
    stored_at: String,
) -> Result<StoredEntry, Error> {
    let method = Method::from_bytes(method.as_bytes()).map_err(|e| Error::CorruptEntry(e.to_string()))?;
    let url = Url::parse(&url).map_err(|e| Error::CorruptEntry(e.to_string()))?;
    let kind = match kind.as_str() {
        "opaque" => ResponseKind::Opaque,
        "basic" => {
            let status = status
                .and_then(|s| u16::try_from(s).ok())
                .ok_or_else(|| Error::CorruptEntry(format!("basic entry without status: {url}")))?;
            let headers: Headers = match headers_json {
                Some(json) => serde_json::from_str(&json).map_err(|e| Error::CorruptEntry(e.to_string()))?,
                None => Vec::new(),
            };
            ResponseKind::Basic { status, headers }
        }
        other => return Err(Error::CorruptEntry(format!("unknown kind: {other}"))),
    };
    let stored_at = DateTime::parse_from_rfc3339(&stored_at)
        .map_err(|e| Error::CorruptEntry(e.to_string()))?
        .with_timezone(&Utc);

    Ok(StoredEntry { method, url, kind, body: body.into(), stored_at })
}

impl CacheDb {
    /// Get the entry for (method, URL) in a namespace.
    ///
    /// Returns None if nothing is stored under that key.
    pub async fn get_entry(&self, namespace: &Namespace, method: &Method, url: &Url) -> Result<Option<StoredEntry>, Error> {
        let name = namespace.tag().as_str().to_string();
        let key_hash = compute_entry_key(method.as_str(), url.as_str());
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, kind, status, headers_json, body, stored_at
                    FROM entries WHERE namespace = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![name, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                });

                match result {
                    Ok((method, url, kind, status, headers_json, body, stored_at)) => {
                        decode_row(method, url, kind, status, headers_json, body, stored_at).map(Some)
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace one entry.
    ///
    /// Fails if the namespace no longer exists.
    pub async fn put_entry(&self, namespace: &Namespace, entry: &StoredEntry) -> Result<(), Error> {
        let name = namespace.tag().as_str().to_string();
        let row = EntryRow::from_entry(entry)?;
        self.conn
            .call(move |conn| -> Result<(), Error> { row.insert(conn, &name) })
            .await
            .map_err(Error::from)
    }

    /// Insert a batch of entries in one transaction: all land or none do.
    pub async fn put_entries(&self, namespace: &Namespace, entries: &[StoredEntry]) -> Result<(), Error> {
        let name = namespace.tag().as_str().to_string();
        let rows = entries.iter().map(EntryRow::from_entry).collect::<Result<Vec<_>, _>>()?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for row in &rows {
                    row.insert(&tx, &name)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a namespace.
    pub async fn count_entries(&self, namespace: &Namespace) -> Result<u64, Error> {
        let name = namespace.tag().as_str().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE namespace = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
