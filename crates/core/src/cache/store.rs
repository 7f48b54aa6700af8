//! The namespace store capability.

use std::collections::BTreeSet;

use async_trait::async_trait;
use http::Method;
use url::Url;

use super::{CacheDb, Namespace, StoredEntry};
use crate::{Error, NamespaceTag};

/// Persistent key-value store addressed by namespace tag.
///
/// Writes are best-effort from the engine's point of view: callers log a
/// failed `put` and keep serving the in-memory response.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Open (create if absent) the namespace for `tag`.
    async fn open(&self, tag: &NamespaceTag) -> Result<Namespace, Error>;

    async fn get(&self, namespace: &Namespace, method: &Method, url: &Url) -> Result<Option<StoredEntry>, Error>;

    async fn put(&self, namespace: &Namespace, entry: StoredEntry) -> Result<(), Error>;

    /// Write every entry or none of them.
    async fn put_all(&self, namespace: &Namespace, entries: Vec<StoredEntry>) -> Result<(), Error>;

    async fn list_tags(&self) -> Result<BTreeSet<NamespaceTag>, Error>;

    /// Irreversibly remove one namespace; returns false if it was absent.
    async fn delete(&self, tag: &NamespaceTag) -> Result<bool, Error>;
}

#[async_trait]
impl NamespaceStore for CacheDb {
    async fn open(&self, tag: &NamespaceTag) -> Result<Namespace, Error> {
        self.open_namespace(tag).await
    }

    async fn get(&self, namespace: &Namespace, method: &Method, url: &Url) -> Result<Option<StoredEntry>, Error> {
        self.get_entry(namespace, method, url).await
    }

    async fn put(&self, namespace: &Namespace, entry: StoredEntry) -> Result<(), Error> {
        self.put_entry(namespace, &entry).await
    }

    async fn put_all(&self, namespace: &Namespace, entries: Vec<StoredEntry>) -> Result<(), Error> {
        self.put_entries(namespace, &entries).await
    }

    async fn list_tags(&self) -> Result<BTreeSet<NamespaceTag>, Error> {
        CacheDb::list_tags(self).await
    }

    async fn delete(&self, tag: &NamespaceTag) -> Result<bool, Error> {
        self.delete_namespace(tag).await
    }
}
