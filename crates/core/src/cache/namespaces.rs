//! Namespace lifecycle: create, enumerate, delete.

use std::collections::BTreeSet;

use super::connection::CacheDb;
use crate::{Error, NamespaceTag};
use tokio_rusqlite::params;

/// Handle to an opened namespace.
///
/// Obtained from [`CacheDb::open_namespace`] or any other
/// [`NamespaceStore`](super::NamespaceStore); entries are read and written
/// through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    tag: NamespaceTag,
}

impl Namespace {
    pub fn new(tag: NamespaceTag) -> Self {
        Self { tag }
    }

    pub fn tag(&self) -> &NamespaceTag {
        &self.tag
    }
}

impl CacheDb {
    /// Open (create if absent) the namespace for `tag`.
    pub async fn open_namespace(&self, tag: &NamespaceTag) -> Result<Namespace, Error> {
        let name = tag.as_str().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO namespaces (tag, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Namespace::new(tag.clone()))
    }

    /// All namespace tags currently present.
    pub async fn list_tags(&self) -> Result<BTreeSet<NamespaceTag>, Error> {
        let names = self
            .conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT tag FROM namespaces ORDER BY tag")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut names = Vec::new();
                for row in rows {
                    names.push(row?);
                }
                Ok(names)
            })
            .await
            .map_err(Error::from)?;

        names.into_iter().map(NamespaceTag::new).collect()
    }

    /// Delete a namespace and every entry in it.
    ///
    /// Returns false if the tag did not exist. Irreversible.
    pub async fn delete_namespace(&self, tag: &NamespaceTag) -> Result<bool, Error> {
        let name = tag.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE namespace = ?1", params![name])?;
                let removed = tx.execute("DELETE FROM namespaces WHERE tag = ?1", params![name])?;
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }
}
