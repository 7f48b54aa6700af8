//! Asset manifests and population modes.

use std::collections::HashSet;

use url::Url;

use crate::url::{resolve, same_origin};
use crate::{Error, RequestMode};

/// How a batch of assets is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationMode {
    /// All-or-nothing: one failure fails the whole population.
    Strict,
    /// Each asset stands alone; failures are logged and skipped.
    BestEffort,
}

impl PopulationMode {
    /// Request mode used when fetching assets of this batch.
    ///
    /// Optional assets live on other origins and are fetched `no-cors`,
    /// so they come back opaque.
    pub fn request_mode(self) -> RequestMode {
        match self {
            PopulationMode::Strict => RequestMode::Cors,
            PopulationMode::BestEffort => RequestMode::NoCors,
        }
    }
}

/// The two disjoint asset lists declared by an engine build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    required: Vec<Url>,
    optional: Vec<Url>,
}

impl AssetManifest {
    /// Build a manifest, dropping duplicates within a list.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidManifest` if a URL appears in both lists.
    pub fn new(required: Vec<Url>, optional: Vec<Url>) -> Result<Self, Error> {
        let required = dedup(required);
        let optional = dedup(optional);

        let seen: HashSet<&Url> = required.iter().collect();
        if let Some(url) = optional.iter().find(|url| seen.contains(url)) {
            return Err(Error::InvalidManifest(format!("{url} is listed as both required and optional")));
        }

        Ok(Self { required, optional })
    }

    /// Resolve relative references against the application origin.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidManifest` if a required asset lives off the
    /// application origin, an optional asset lives on it, or the lists overlap.
    pub fn resolve(base: &Url, required: &[&str], optional: &[&str]) -> Result<Self, Error> {
        let resolve_all = |items: &[&str]| -> Result<Vec<Url>, Error> {
            items
                .iter()
                .map(|item| resolve(base, item).map_err(Error::from))
                .collect()
        };
        let manifest = Self::new(resolve_all(required)?, resolve_all(optional)?)?;

        if let Some(url) = manifest.required.iter().find(|url| !same_origin(base, url)) {
            let origin = base.origin().ascii_serialization();
            return Err(Error::InvalidManifest(format!("required asset {url} is not on {origin}")));
        }
        if let Some(url) = manifest.optional.iter().find(|url| same_origin(base, url)) {
            return Err(Error::InvalidManifest(format!(
                "optional asset {url} is on the application origin; list it as required"
            )));
        }

        Ok(manifest)
    }

    pub fn required(&self) -> &[Url] {
        &self.required
    }

    pub fn optional(&self) -> &[Url] {
        &self.optional
    }

    /// Batches in population order: required first.
    pub fn batches(&self) -> [(PopulationMode, &[Url]); 2] {
        [(PopulationMode::Strict, self.required.as_slice()), (PopulationMode::BestEffort, self.optional.as_slice())]
    }

    pub fn len(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dedup(urls: Vec<Url>) -> Vec<Url> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|url| seen.insert(url.clone())).collect()
}
