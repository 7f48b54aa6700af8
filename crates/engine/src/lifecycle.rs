//! Version lifecycle: install, wait, activate, serve, retire.
//!
//! A [`Worker`] is one engine build (a tag plus its manifest) moving through
//! `INSTALLING -> WAITING -> ACTIVATING -> ACTIVE`, or into `REDUNDANT` from
//! any earlier state. A [`Registration`] owns at most one waiting and one
//! active worker and routes intercepted requests to the active one.

use std::fmt;
use std::sync::Arc;

use precache_core::{AppConfig, AssetManifest, Error, Fetcher, NamespaceStore, NamespaceTag, Request, Strategy};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::collector::GarbageCollector;
use crate::consumers::{Consumer, Consumers};
use crate::interceptor::{FetchOutcome, Interceptor, ResponseSource};
use crate::populator::{PopulationReport, Populator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "INSTALLING",
            WorkerState::Waiting => "WAITING",
            WorkerState::Activating => "ACTIVATING",
            WorkerState::Active => "ACTIVE",
            WorkerState::Redundant => "REDUNDANT",
        };
        f.write_str(name)
    }
}

/// One engine build.
#[derive(Debug, Clone)]
pub struct Worker {
    tag: NamespaceTag,
    manifest: AssetManifest,
    state: WorkerState,
}

impl Worker {
    pub fn new(tag: NamespaceTag, manifest: AssetManifest) -> Self {
        Self { tag, manifest, state: WorkerState::Installing }
    }

    pub fn tag(&self) -> &NamespaceTag {
        &self.tag
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Population succeeded.
    pub fn installed(&mut self) -> Result<(), Error> {
        self.advance(WorkerState::Waiting)
    }

    pub fn begin_activation(&mut self) -> Result<(), Error> {
        self.advance(WorkerState::Activating)
    }

    pub fn activated(&mut self) -> Result<(), Error> {
        self.advance(WorkerState::Active)
    }

    /// Failed, replaced, or superseded. Terminal.
    pub fn make_redundant(&mut self) -> Result<(), Error> {
        self.advance(WorkerState::Redundant)
    }

    fn advance(&mut self, to: WorkerState) -> Result<(), Error> {
        let allowed = matches!(
            (self.state, to),
            (WorkerState::Installing, WorkerState::Waiting)
                | (WorkerState::Waiting, WorkerState::Activating)
                | (WorkerState::Activating, WorkerState::Active)
        ) || (to == WorkerState::Redundant && self.state != WorkerState::Redundant);

        if !allowed {
            return Err(Error::InvalidTransition { from: self.state.to_string(), to: to.to_string() });
        }

        tracing::debug!(tag = %self.tag, from = %self.state, to = %to, "worker transition");
        self.state = to;
        Ok(())
    }
}

/// Engine behavior knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub strategy: Strategy,
    pub skip_waiting: bool,
    pub offline_fallback: Option<Url>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { strategy: Strategy::default(), skip_waiting: true, offline_fallback: None }
    }
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self {
            strategy: config.strategy,
            skip_waiting: config.skip_waiting,
            offline_fallback: config.offline_fallback_url()?,
        })
    }
}

/// Result of a successful install.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub report: PopulationReport,
    /// `Active` if the new version took over, `Waiting` if it is held back
    /// for open consumers.
    pub state: WorkerState,
}

struct ActiveWorker {
    worker: Worker,
    interceptor: Arc<Interceptor>,
}

#[derive(Default)]
struct Slots {
    waiting: Option<Worker>,
    active: Option<ActiveWorker>,
}

/// Lifecycle controller for one application origin.
pub struct Registration {
    store: Arc<dyn NamespaceStore>,
    fetcher: Arc<dyn Fetcher>,
    options: EngineOptions,
    populator: Populator,
    collector: GarbageCollector,
    consumers: Consumers,
    slots: RwLock<Slots>,
    /// Serializes install and activation jobs; held from population through
    /// collection so one build never collects another's fresh namespace.
    jobs: Mutex<()>,
}

impl Registration {
    pub fn new(store: Arc<dyn NamespaceStore>, fetcher: Arc<dyn Fetcher>, options: EngineOptions) -> Self {
        let populator = Populator::new(Arc::clone(&store), Arc::clone(&fetcher));
        let collector = GarbageCollector::new(Arc::clone(&store));
        Self {
            store,
            fetcher,
            options,
            populator,
            collector,
            consumers: Consumers::new(),
            slots: RwLock::new(Slots::default()),
            jobs: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Install a new build: populate its namespace, then activate it unless
    /// it has to wait for open consumers.
    ///
    /// Installs and activations run one at a time, in call order.
    ///
    /// # Errors
    ///
    /// Returns `Error::PopulationFailed` when a required asset cannot be
    /// populated; the active version, if any, keeps serving. Returns
    /// `Error::InvalidInput` when `tag` is the active tag.
    pub async fn install(&self, tag: NamespaceTag, manifest: AssetManifest) -> Result<InstallOutcome, Error> {
        let _job = self.jobs.lock().await;

        if self.active_tag().await.as_ref() == Some(&tag) {
            return Err(Error::InvalidInput(format!("tag {tag} is already active")));
        }

        let mut worker = Worker::new(tag.clone(), manifest);
        tracing::info!(tag = %tag, assets = worker.manifest().len(), "installing");

        let report = match self.populator.populate(worker.tag(), worker.manifest()).await {
            Ok(report) => report,
            Err(e) => {
                worker.make_redundant()?;
                tracing::warn!(tag = %tag, error = %e, "install failed; keeping current version");
                return Err(e);
            }
        };
        worker.installed()?;

        let replaced = self.slots.write().await.waiting.replace(worker);
        if let Some(mut previous) = replaced {
            previous.make_redundant()?;
            tracing::info!(tag = %previous.tag(), replaced_by = %tag, "waiting version replaced");
        }

        if !self.should_activate().await {
            tracing::info!(tag = %tag, consumers = self.consumers.count(), "waiting for consumers to close");
            return Ok(InstallOutcome { report, state: WorkerState::Waiting });
        }

        self.activate_waiting().await?;
        Ok(InstallOutcome { report, state: WorkerState::Active })
    }

    async fn should_activate(&self) -> bool {
        self.options.skip_waiting || self.consumers.count() == 0 || self.slots.read().await.active.is_none()
    }

    /// Promote the waiting worker: collect every other namespace, switch
    /// interception to the new one, and claim open consumers.
    ///
    /// Returns the newly active tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoWaitingWorker` if nothing is waiting.
    pub async fn activate(&self) -> Result<NamespaceTag, Error> {
        let _job = self.jobs.lock().await;
        self.activate_waiting().await
    }

    /// Activation body; the caller holds `jobs`.
    async fn activate_waiting(&self) -> Result<NamespaceTag, Error> {
        let mut worker = self.slots.write().await.waiting.take().ok_or(Error::NoWaitingWorker)?;
        worker.begin_activation()?;
        let tag = worker.tag().clone();

        let namespace = match self.store.open(&tag).await {
            Ok(namespace) => namespace,
            Err(e) => {
                worker.make_redundant()?;
                tracing::warn!(tag = %tag, error = %e, "activation failed");
                return Err(e);
            }
        };

        match self.collector.collect(&tag).await {
            Ok(report) => tracing::debug!(
                tag = %tag,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "stale namespaces collected"
            ),
            Err(e) => tracing::warn!(tag = %tag, error = %e, "could not list namespaces for collection"),
        }

        let interceptor = Interceptor::new(
            namespace,
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            self.options.strategy,
        )
        .with_offline_fallback(self.options.offline_fallback.clone());
        worker.activated()?;

        let previous = self
            .slots
            .write()
            .await
            .active
            .replace(ActiveWorker { worker, interceptor: Arc::new(interceptor) });
        if let Some(mut previous) = previous {
            previous.worker.make_redundant()?;
        }

        self.consumers.claim(&tag);
        tracing::info!(tag = %tag, strategy = ?self.options.strategy, "activated");

        Ok(tag)
    }

    /// Activate a waiting worker once no consumers remain.
    ///
    /// Returns the activated tag, or `None` if nothing was promoted.
    pub async fn activate_if_idle(&self) -> Result<Option<NamespaceTag>, Error> {
        let _job = self.jobs.lock().await;
        if self.consumers.count() > 0 {
            return Ok(None);
        }

        match self.activate_waiting().await {
            Ok(tag) => Ok(Some(tag)),
            Err(Error::NoWaitingWorker) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Answer an intercepted request with the active version.
    ///
    /// Requests arriving before any version is active go to the network.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome, Error> {
        let interceptor = self.slots.read().await.active.as_ref().map(|active| Arc::clone(&active.interceptor));

        match interceptor {
            Some(interceptor) => interceptor.intercept(request).await,
            None => {
                tracing::debug!(url = %request.url, "no active version; passing through");
                let response = self.fetcher.fetch(&request).await?;
                Ok(FetchOutcome::new(response, ResponseSource::Passthrough))
            }
        }
    }

    /// Open a consumer (an application page) under this registration.
    pub fn connect(&self) -> Consumer {
        self.consumers.connect()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.count()
    }

    pub async fn active_tag(&self) -> Option<NamespaceTag> {
        self.slots.read().await.active.as_ref().map(|active| active.worker.tag().clone())
    }

    pub async fn waiting_tag(&self) -> Option<NamespaceTag> {
        self.slots.read().await.waiting.as_ref().map(|worker| worker.tag().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FlakyStore, StubNetwork, tag, url};
    use precache_core::{Method, RequestMode};

    const ORIGIN: &str = "https://glr.test/";

    fn manifest() -> AssetManifest {
        AssetManifest::resolve(
            &url(ORIGIN),
            &["/", "/index.html", "/manifest.json"],
            &["https://cdn.tailwindcss.com"],
        )
        .unwrap()
    }

    fn network(version: &str) -> Arc<StubNetwork> {
        let network = Arc::new(StubNetwork::default());
        serve(&network, version);
        network
    }

    fn serve(network: &StubNetwork, version: &str) {
        network.respond("https://glr.test/", 200, &format!("root {version}"));
        network.respond("https://glr.test/index.html", 200, &format!("index {version}"));
        network.respond("https://glr.test/manifest.json", 200, "{}");
        network.respond_opaque("https://cdn.tailwindcss.com", "tw");
    }

    fn registration(store: &Arc<FlakyStore>, network: &Arc<StubNetwork>, options: EngineOptions) -> Registration {
        Registration::new(store.clone(), network.clone(), options)
    }

    fn held_back() -> EngineOptions {
        EngineOptions { skip_waiting: false, ..EngineOptions::default() }
    }

    async fn body_of(registration: &Registration, u: &str) -> String {
        let outcome = registration.handle_fetch(Request::get(url(u))).await.unwrap();
        outcome.response.into_body().text().unwrap()
    }

    #[test]
    fn test_worker_happy_path() {
        let mut worker = Worker::new(tag("v1"), manifest());
        assert_eq!(worker.state(), WorkerState::Installing);
        worker.installed().unwrap();
        worker.begin_activation().unwrap();
        worker.activated().unwrap();
        assert_eq!(worker.state(), WorkerState::Active);
        worker.make_redundant().unwrap();
        assert_eq!(worker.state(), WorkerState::Redundant);
    }

    #[test]
    fn test_worker_rejects_skipped_states() {
        let mut worker = Worker::new(tag("v1"), manifest());
        let err = worker.activated().unwrap_err();
        assert_eq!(err.to_string(), "INVALID_TRANSITION: INSTALLING -> ACTIVE");
        assert!(worker.begin_activation().is_err());

        worker.make_redundant().unwrap();
        assert!(worker.make_redundant().is_err());
        assert!(worker.installed().is_err());
    }

    #[tokio::test]
    async fn test_install_activates_and_claims() {
        let store = Arc::new(FlakyStore::new().await);
        let registration = registration(&store, &network("v1"), EngineOptions::default());
        let mut page = registration.connect();

        let outcome = registration.install(tag("v1"), manifest()).await.unwrap();

        assert_eq!(outcome.state, WorkerState::Active);
        assert_eq!(outcome.report.required, 3);
        assert_eq!(registration.active_tag().await, Some(tag("v1")));
        assert_eq!(registration.waiting_tag().await, None);
        assert_eq!(page.controller_changed().await, Some(tag("v1")));
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_version() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = registration(&store, &network, EngineOptions::default());
        registration.install(tag("v1"), manifest()).await.unwrap();

        serve(&network, "v2");
        network.fail("https://glr.test/manifest.json");
        let err = registration.install(tag("v2"), manifest()).await.unwrap_err();

        assert!(err.is_population_failure());
        assert_eq!(registration.active_tag().await, Some(tag("v1")));
        assert_eq!(registration.waiting_tag().await, None);
        assert_eq!(body_of(&registration, "https://glr.test/index.html").await, "index v1");
    }

    #[tokio::test]
    async fn test_upgrade_collects_previous_namespace() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = registration(&store, &network, EngineOptions::default());
        registration.install(tag("v1"), manifest()).await.unwrap();

        serve(&network, "v2");
        registration.install(tag("v2"), manifest()).await.unwrap();

        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("v2")]);
        assert_eq!(body_of(&registration, "https://glr.test/index.html").await, "index v2");
    }

    #[tokio::test]
    async fn test_collection_failure_does_not_block_activation() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = registration(&store, &network, EngineOptions::default());
        registration.install(tag("v1"), manifest()).await.unwrap();
        store.fail_delete_of(&tag("v1"));

        let outcome = registration.install(tag("v2"), manifest()).await.unwrap();

        assert_eq!(outcome.state, WorkerState::Active);
        assert_eq!(registration.active_tag().await, Some(tag("v2")));
        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("v1"), tag("v2")]);
    }

    #[tokio::test]
    async fn test_overlapping_installs_run_in_order() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = Arc::new(registration(&store, &network, EngineOptions::default()));
        registration.install(tag("v1"), manifest()).await.unwrap();

        serve(&network, "v2");
        let (parked, release) = store.hold_next_list();
        let first = tokio::spawn({
            let registration = Arc::clone(&registration);
            async move { registration.install(tag("v2"), manifest()).await }
        });
        parked.notified().await;

        serve(&network, "v3");
        let second = tokio::spawn({
            let registration = Arc::clone(&registration);
            async move { registration.install(tag("v3"), manifest()).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!second.is_finished());

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap().state, WorkerState::Active);
        assert_eq!(second.await.unwrap().unwrap().state, WorkerState::Active);

        assert_eq!(registration.active_tag().await, Some(tag("v3")));
        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("v3")]);
        let outcome = registration.handle_fetch(Request::get(url("https://glr.test/index.html"))).await.unwrap();
        assert_eq!(outcome.source, ResponseSource::Cache);
        assert_eq!(outcome.response.into_body().text().unwrap(), "index v3");
    }

    #[tokio::test]
    async fn test_first_install_activates_without_skip_waiting() {
        let store = Arc::new(FlakyStore::new().await);
        let registration = registration(&store, &network("v1"), held_back());
        let _page = registration.connect();

        let outcome = registration.install(tag("v1"), manifest()).await.unwrap();

        assert_eq!(outcome.state, WorkerState::Active);
    }

    #[tokio::test]
    async fn test_waits_for_consumers_without_skip_waiting() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = registration(&store, &network, held_back());
        registration.install(tag("v1"), manifest()).await.unwrap();
        let page = registration.connect();

        serve(&network, "v2");
        let outcome = registration.install(tag("v2"), manifest()).await.unwrap();
        assert_eq!(outcome.state, WorkerState::Waiting);
        assert_eq!(registration.waiting_tag().await, Some(tag("v2")));
        assert_eq!(registration.active_tag().await, Some(tag("v1")));
        assert_eq!(registration.activate_if_idle().await.unwrap(), None);
        assert_eq!(body_of(&registration, "https://glr.test/index.html").await, "index v1");

        drop(page);
        assert_eq!(registration.activate_if_idle().await.unwrap(), Some(tag("v2")));
        assert_eq!(registration.active_tag().await, Some(tag("v2")));
        assert_eq!(body_of(&registration, "https://glr.test/index.html").await, "index v2");
    }

    #[tokio::test]
    async fn test_newer_install_replaces_waiting_worker() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = registration(&store, &network, held_back());
        registration.install(tag("v1"), manifest()).await.unwrap();
        let _page = registration.connect();

        registration.install(tag("v2"), manifest()).await.unwrap();
        registration.install(tag("v3"), manifest()).await.unwrap();
        assert_eq!(registration.waiting_tag().await, Some(tag("v3")));

        assert_eq!(registration.activate().await.unwrap(), tag("v3"));
        let tags: Vec<_> = store.db().list_tags().await.unwrap().into_iter().collect();
        assert_eq!(tags, vec![tag("v3")]);
    }

    #[tokio::test]
    async fn test_reinstalling_active_tag_rejected() {
        let store = Arc::new(FlakyStore::new().await);
        let registration = registration(&store, &network("v1"), EngineOptions::default());
        registration.install(tag("v1"), manifest()).await.unwrap();

        let err = registration.install(tag("v1"), manifest()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_activate_without_waiting_worker() {
        let store = Arc::new(FlakyStore::new().await);
        let registration = registration(&store, &network("v1"), EngineOptions::default());

        assert!(matches!(registration.activate().await, Err(Error::NoWaitingWorker)));
        assert_eq!(registration.activate_if_idle().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let store = Arc::new(FlakyStore::new().await);
        let registration = registration(&store, &network("v1"), EngineOptions::default());

        let outcome = registration.handle_fetch(Request::get(url("https://glr.test/index.html"))).await.unwrap();

        assert_eq!(outcome.source, ResponseSource::Passthrough);
        assert_eq!(store.gets(), 0);
    }

    #[tokio::test]
    async fn test_offline_fallback_from_options() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let options =
            EngineOptions { offline_fallback: Some(url("https://glr.test/index.html")), ..EngineOptions::default() };
        let registration = registration(&store, &network, options);
        registration.install(tag("v1"), manifest()).await.unwrap();

        let navigation = Request::get(url("https://glr.test/routes/7")).with_mode(RequestMode::Navigate);
        let outcome = registration.handle_fetch(navigation).await.unwrap();

        assert_eq!(outcome.source, ResponseSource::Fallback);
        assert_eq!(outcome.response.into_body().text().unwrap(), "index v1");
    }

    #[tokio::test]
    async fn test_non_get_passes_through_active_version() {
        let store = Arc::new(FlakyStore::new().await);
        let network = network("v1");
        let registration = registration(&store, &network, EngineOptions::default());
        registration.install(tag("v1"), manifest()).await.unwrap();
        let gets = store.gets();
        network.respond("https://glr.test/api/visits", 204, "");

        let request = Request::new(Method::DELETE, url("https://glr.test/api/visits"));
        let outcome = registration.handle_fetch(request).await.unwrap();

        assert_eq!(outcome.source, ResponseSource::Passthrough);
        assert_eq!(store.gets(), gets);
    }

    #[test]
    fn test_options_from_config() {
        let config = AppConfig::from_toml_str(
            r#"
            tag = "glr-zurich-v1"
            origin = "https://glr.test/"
            required = ["/", "/index.html"]
            strategy = "stale-while-revalidate"
            skip_waiting = false
            offline_fallback = "/index.html"
            "#,
        )
        .unwrap();

        let options = EngineOptions::from_config(&config).unwrap();
        assert_eq!(options.strategy, Strategy::StaleWhileRevalidate);
        assert!(!options.skip_waiting);
        assert_eq!(options.offline_fallback, Some(url("https://glr.test/index.html")));
    }
}
