//! Activation-time removal of stale namespaces.

use std::sync::Arc;

use futures_util::future::join_all;
use precache_core::{Error, NamespaceStore, NamespaceTag};

/// Outcome of one collection pass.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub kept: NamespaceTag,
    pub deleted: Vec<NamespaceTag>,
    pub failed: Vec<(NamespaceTag, String)>,
}

/// Deletes every namespace except the current one.
#[derive(Clone)]
pub struct GarbageCollector {
    store: Arc<dyn NamespaceStore>,
}

impl GarbageCollector {
    pub fn new(store: Arc<dyn NamespaceStore>) -> Self {
        Self { store }
    }

    /// Delete every namespace whose tag is not `keep`.
    ///
    /// Deletions are independent: one failing does not stop the others, and
    /// nothing already deleted is restored.
    ///
    /// # Errors
    ///
    /// Returns an error only if the existing tags cannot be listed.
    pub async fn collect(&self, keep: &NamespaceTag) -> Result<CollectionReport, Error> {
        let stale: Vec<NamespaceTag> = self
            .store
            .list_tags()
            .await?
            .into_iter()
            .filter(|tag| tag != keep)
            .collect();

        let results = join_all(stale.iter().map(|tag| self.store.delete(tag))).await;

        let mut report = CollectionReport { kept: keep.clone(), deleted: Vec::new(), failed: Vec::new() };
        for (tag, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    tracing::debug!(tag = %tag, "deleted stale namespace");
                    report.deleted.push(tag);
                }
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "failed to delete stale namespace");
                    report.failed.push((tag, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FlakyStore, tag};

    async fn store_with(tags: &[&str]) -> Arc<FlakyStore> {
        let store = Arc::new(FlakyStore::new().await);
        for t in tags {
            store.db().open_namespace(&tag(t)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_only_target_survives() {
        let store = store_with(&["glr-zurich-v1", "glr-zurich-v2", "glr-zurich-v3"]).await;
        let collector = GarbageCollector::new(store.clone());

        let report = collector.collect(&tag("glr-zurich-v3")).await.unwrap();

        assert_eq!(report.deleted.len(), 2);
        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("glr-zurich-v3")]);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let store = store_with(&["v1", "v2"]).await;
        let collector = GarbageCollector::new(store.clone());

        collector.collect(&tag("v2")).await.unwrap();
        let again = collector.collect(&tag("v2")).await.unwrap();

        assert!(again.deleted.is_empty());
        assert!(again.failed.is_empty());
        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("v2")]);
    }

    #[tokio::test]
    async fn test_one_failed_deletion_does_not_block_others() {
        let store = store_with(&["v1", "v2", "v3"]).await;
        store.fail_delete_of(&tag("v1"));
        let collector = GarbageCollector::new(store.clone());

        let report = collector.collect(&tag("v3")).await.unwrap();

        assert_eq!(report.deleted, vec![tag("v2")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, tag("v1"));
        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("v1"), tag("v3")]);
    }

    #[tokio::test]
    async fn test_tag_comparison_is_exact() {
        let store = store_with(&["app-v1", "App-v1"]).await;
        let collector = GarbageCollector::new(store.clone());

        collector.collect(&tag("app-v1")).await.unwrap();

        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("app-v1")]);
    }
}
