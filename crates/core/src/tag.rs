//! Namespace tags identifying one generation of the cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Opaque name of one cache generation.
///
/// Each engine build picks a tag distinct from every prior build; the
/// garbage collector relies on exact string equality to find survivors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceTag(String);

impl NamespaceTag {
    /// Create a tag, rejecting empty or whitespace-only names.
    pub fn new(tag: impl Into<String>) -> Result<Self, Error> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(Error::InvalidInput("namespace tag cannot be empty".into()));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
