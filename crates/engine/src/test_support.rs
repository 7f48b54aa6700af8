//! Stub collaborators for engine unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use precache_core::{
    CacheDb, Error, Fetcher, Method, Namespace, NamespaceStore, NamespaceTag, Request, Response, StoredEntry,
};
use tokio::sync::{Notify, oneshot};
use url::Url;

pub(crate) fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub(crate) fn tag(s: &str) -> NamespaceTag {
    NamespaceTag::new(s).unwrap()
}

#[derive(Clone)]
enum Route {
    Basic(u16, String),
    Opaque(String),
    Fail,
}

/// Canned network: unknown URLs fail like an unreachable host.
#[derive(Default)]
pub(crate) struct StubNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl StubNetwork {
    pub(crate) fn respond(&self, u: &str, status: u16, body: &str) {
        self.set(u, Route::Basic(status, body.to_string()));
    }

    pub(crate) fn respond_opaque(&self, u: &str, body: &str) {
        self.set(u, Route::Opaque(body.to_string()));
    }

    pub(crate) fn fail(&self, u: &str) {
        self.set(u, Route::Fail);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_to(&self, u: &str) -> usize {
        let target = url(u).to_string();
        self.calls.lock().unwrap().iter().filter(|(_, called)| *called == target).count()
    }

    fn set(&self, u: &str, route: Route) {
        self.routes.lock().unwrap().insert(url(u).to_string(), route);
    }
}

#[async_trait]
impl Fetcher for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let key = request.url.to_string();
        self.calls.lock().unwrap().push((request.method.clone(), key.clone()));
        let route = self.routes.lock().unwrap().get(&key).cloned().unwrap_or(Route::Fail);
        match route {
            Route::Basic(status, body) => Ok(Response::basic(request.url.clone(), status, vec![], body)),
            Route::Opaque(body) => Ok(Response::opaque(request.url.clone(), body)),
            Route::Fail => Err(Error::Network(format!("{key}: connection refused"))),
        }
    }
}

/// SQLite store that counts reads/writes and can be told to fail.
pub(crate) struct FlakyStore {
    inner: CacheDb,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: Mutex<HashSet<NamespaceTag>>,
    list_gate: Mutex<Option<(Arc<Notify>, oneshot::Receiver<()>)>>,
}

impl FlakyStore {
    pub(crate) async fn new() -> Self {
        Self {
            inner: CacheDb::open_in_memory().await.unwrap(),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            fail_deletes: Mutex::new(HashSet::new()),
            list_gate: Mutex::new(None),
        }
    }

    pub(crate) fn db(&self) -> &CacheDb {
        &self.inner
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete_of(&self, t: &NamespaceTag) {
        self.fail_deletes.lock().unwrap().insert(t.clone());
    }

    /// Park the next `list_tags` call until the returned sender fires.
    ///
    /// The notify fires once the call is parked.
    pub(crate) fn hold_next_list(&self) -> (Arc<Notify>, oneshot::Sender<()>) {
        let parked = Arc::new(Notify::new());
        let (release, held) = oneshot::channel();
        *self.list_gate.lock().unwrap() = Some((Arc::clone(&parked), held));
        (parked, release)
    }

    fn injected() -> Error {
        Error::CorruptEntry("injected write failure".into())
    }
}

#[async_trait]
impl NamespaceStore for FlakyStore {
    async fn open(&self, tag: &NamespaceTag) -> Result<Namespace, Error> {
        self.inner.open_namespace(tag).await
    }

    async fn get(&self, namespace: &Namespace, method: &Method, url: &Url) -> Result<Option<StoredEntry>, Error> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_entry(namespace, method, url).await
    }

    async fn put(&self, namespace: &Namespace, entry: StoredEntry) -> Result<(), Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.put_entry(namespace, &entry).await
    }

    async fn put_all(&self, namespace: &Namespace, entries: Vec<StoredEntry>) -> Result<(), Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.put_entries(namespace, &entries).await
    }

    async fn list_tags(&self) -> Result<BTreeSet<NamespaceTag>, Error> {
        let gate = self.list_gate.lock().unwrap().take();
        if let Some((parked, held)) = gate {
            parked.notify_one();
            let _ = held.await;
        }
        self.inner.list_tags().await
    }

    async fn delete(&self, tag: &NamespaceTag) -> Result<bool, Error> {
        if self.fail_deletes.lock().unwrap().contains(tag) {
            return Err(Error::CorruptEntry(format!("cannot delete {tag}")));
        }
        self.inner.delete_namespace(tag).await
    }
}
