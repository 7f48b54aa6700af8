//! Open consumers of the engine and the controller they observe.
//!
//! Every consumer holds a watch receiver on the controlling namespace tag.
//! A claim replaces that value once, so all open consumers switch to the new
//! namespace together and none needs to reconnect.

use precache_core::NamespaceTag;
use tokio::sync::watch;

/// Registry of connected consumers.
#[derive(Debug)]
pub struct Consumers {
    controller: watch::Sender<Option<NamespaceTag>>,
}

impl Default for Consumers {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumers {
    pub fn new() -> Self {
        let (controller, _) = watch::channel(None);
        Self { controller }
    }

    /// Connect a new consumer; it starts out controlled by the current tag.
    pub fn connect(&self) -> Consumer {
        Consumer { controller: self.controller.subscribe() }
    }

    /// Number of consumers still connected.
    pub fn count(&self) -> usize {
        self.controller.receiver_count()
    }

    /// Hand every open consumer to `tag`.
    pub fn claim(&self, tag: &NamespaceTag) {
        self.controller.send_replace(Some(tag.clone()));
        tracing::debug!(tag = %tag, consumers = self.count(), "claimed consumers");
    }

    pub fn controller(&self) -> Option<NamespaceTag> {
        self.controller.borrow().clone()
    }
}

/// One connected consumer (an open application page).
///
/// Dropping it disconnects.
#[derive(Debug)]
pub struct Consumer {
    controller: watch::Receiver<Option<NamespaceTag>>,
}

impl Consumer {
    /// Tag of the namespace currently serving this consumer.
    pub fn controller(&self) -> Option<NamespaceTag> {
        self.controller.borrow().clone()
    }

    /// Wait for the next claim and return the new controller.
    ///
    /// Returns `None` if the registry has gone away.
    pub async fn controller_changed(&mut self) -> Option<NamespaceTag> {
        self.controller.changed().await.ok()?;
        self.controller.borrow_and_update().clone()
    }
}
