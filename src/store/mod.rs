//! Scoped resource store.
//!
//! Every domain resource in this crate is a remote table mirrored into a
//! local list. The lifecycle is always the same (fetch everything matching
//! a scope, optionally follow a live change feed, replace or append, tear
//! down on rescope), so it is written once here and parameterized per
//! resource with a [`StoreSpec`].
//!
//! Activations are generation-stamped: a fetch response or live event that
//! belongs to a superseded activation is discarded instead of clobbering the
//! current scope's state. Events that arrive while the initial snapshot is
//! still in flight are buffered and applied once it lands.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::platform::{EventKind, Filter, Order, Realtime, RowEvent, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;

/// How a store reacts to its live change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivePolicy {
    /// No feed; the resource refetches after writes instead.
    None,
    /// Append rows from insert events; ignore update/delete events.
    AppendInserts,
    /// Append inserts, refetch the whole list on update/delete
    /// (coarse-grained invalidation).
    AppendAndRefetch,
}

/// Per-resource schema descriptor.
#[derive(Debug, Clone)]
pub struct StoreSpec {
    pub table: &'static str,
    /// Column the scope key filters on; None for unscoped lists.
    pub scope_column: Option<&'static str>,
    pub order: Option<Order>,
    pub live: LivePolicy,
}

pub struct ScopedStore<R> {
    spec: StoreSpec,
    rows: Arc<dyn RowStore>,
    live: Arc<dyn Realtime>,
    inner: Arc<StoreInner<R>>,
}

struct StoreInner<R> {
    snapshot: RwLock<Vec<R>>,
    loading: AtomicBool,
    generation: AtomicU64,
    scope: Mutex<Option<Uuid>>,
    subscription: Mutex<Option<SubscriptionGuard>>,
    buffer: Mutex<EventBuffer>,
    changed: broadcast::Sender<()>,
}

#[derive(Default)]
struct EventBuffer {
    hold: bool,
    events: Vec<RowEvent>,
}

struct SubscriptionGuard {
    task: JoinHandle<()>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        // Aborting drops the consumer future, which drops the feed and
        // closes the transport subscription with it.
        self.task.abort();
    }
}

enum FetchOutcome {
    Applied,
    Stale,
    RefetchNeeded,
}

impl<R> Clone for ScopedStore<R> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            rows: Arc::clone(&self.rows),
            live: Arc::clone(&self.live),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> ScopedStore<R>
where
    R: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(state: &Arc<AppState>, spec: StoreSpec) -> Self {
        let (changed, _) = broadcast::channel(32);
        Self {
            spec,
            rows: Arc::clone(&state.rows),
            live: Arc::clone(&state.live),
            inner: Arc::new(StoreInner {
                snapshot: RwLock::new(Vec::new()),
                loading: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                scope: Mutex::new(None),
                subscription: Mutex::new(None),
                buffer: Mutex::new(EventBuffer::default()),
                changed,
            }),
        }
    }

    pub fn table(&self) -> &'static str {
        self.spec.table
    }

    /// Current mirrored rows. Empty while no activation has completed, after
    /// a failed fetch, or when the scope is absent.
    pub async fn snapshot(&self) -> Vec<R> {
        self.inner.snapshot.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(AtomicOrdering::SeqCst)
    }

    /// Notified after every snapshot change.
    pub fn watch(&self) -> broadcast::Receiver<()> {
        self.inner.changed.subscribe()
    }

    /// Fetch-only activation. A scoped store given no scope clears its state
    /// and goes idle without touching the network.
    pub async fn activate(&self, scope: Option<Uuid>) -> Result<(), StoreError> {
        let generation = self.begin_generation(scope).await;
        self.fetch_into(generation, scope).await
    }

    /// Fetch plus live feed: the fetch is issued first, the feed opened
    /// second, and events that beat the snapshot are buffered until it lands.
    pub async fn activate_live(&self, scope: Option<Uuid>) -> Result<(), StoreError> {
        if self.spec.live == LivePolicy::None {
            return self.activate(scope).await;
        }
        let generation = self.begin_generation(scope).await;
        if self.spec.scope_column.is_some() && scope.is_none() {
            return self.fetch_into(generation, scope).await;
        }

        self.inner.loading.store(true, AtomicOrdering::SeqCst);
        {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.hold = true;
            buffer.events.clear();
        }

        let rows = Arc::clone(&self.rows);
        let table = self.spec.table;
        let filters = self.scope_filters(scope);
        let order = self.spec.order.clone();
        let fetch =
            tokio::spawn(async move { rows.select(table, &filters, order.as_ref()).await });

        if let Err(e) = self.open_feed(generation, scope).await {
            warn!("{}: live feed unavailable: {}", self.spec.table, e);
        }

        let result = match fetch.await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Remote(format!(
                "fetch task for {} failed: {}",
                self.spec.table, e
            ))),
        };
        match self.complete_fetch(generation, result).await? {
            FetchOutcome::RefetchNeeded => self.fetch_into(generation, scope).await,
            _ => Ok(()),
        }
    }

    /// Open (or replace) the live feed for the given scope. At most one
    /// subscription exists per store at any time.
    pub async fn subscribe(&self, scope: Option<Uuid>) -> Result<(), StoreError> {
        if self.spec.live == LivePolicy::None {
            return Ok(());
        }
        let generation = self.inner.generation.load(AtomicOrdering::SeqCst);
        self.open_feed(generation, scope).await
    }

    /// Close the feed and drop all local state.
    pub async fn deactivate(&self) {
        let generation = self.begin_generation(None).await;
        self.install_snapshot(Vec::new()).await;
        self.inner.loading.store(false, AtomicOrdering::SeqCst);
        debug!("{}: deactivated at generation {}", self.spec.table, generation);
    }

    /// Re-run the fetch for the current scope (used after writes on
    /// resources without a live feed).
    pub async fn refetch(&self) -> Result<(), StoreError> {
        let scope = *self.inner.scope.lock().await;
        let generation = self.inner.generation.load(AtomicOrdering::SeqCst);
        self.fetch_into(generation, scope).await
    }

    pub async fn current_scope(&self) -> Option<Uuid> {
        *self.inner.scope.lock().await
    }

    async fn begin_generation(&self, scope: Option<Uuid>) -> u64 {
        let generation = self.inner.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        *self.inner.scope.lock().await = scope;
        // Dropping the guard aborts the consumer task and closes the feed.
        self.inner.subscription.lock().await.take();
        let mut buffer = self.inner.buffer.lock().await;
        buffer.hold = false;
        buffer.events.clear();
        generation
    }

    fn scope_filters(&self, scope: Option<Uuid>) -> Vec<Filter> {
        match (self.spec.scope_column, scope) {
            (Some(column), Some(id)) => vec![Filter::eq(column, id)],
            _ => Vec::new(),
        }
    }

    async fn fetch_into(&self, generation: u64, scope: Option<Uuid>) -> Result<(), StoreError> {
        if self.spec.scope_column.is_some() && scope.is_none() {
            if generation == self.inner.generation.load(AtomicOrdering::SeqCst) {
                self.install_snapshot(Vec::new()).await;
                self.inner.loading.store(false, AtomicOrdering::SeqCst);
            }
            return Ok(());
        }

        let filters = self.scope_filters(scope);
        loop {
            self.inner.loading.store(true, AtomicOrdering::SeqCst);
            let result = self
                .rows
                .select(self.spec.table, &filters, self.spec.order.as_ref())
                .await;
            match self.complete_fetch(generation, result).await? {
                FetchOutcome::RefetchNeeded => continue,
                _ => return Ok(()),
            }
        }
    }

    async fn complete_fetch(
        &self,
        generation: u64,
        result: Result<Vec<Value>, StoreError>,
    ) -> Result<FetchOutcome, StoreError> {
        if generation != self.inner.generation.load(AtomicOrdering::SeqCst) {
            debug!(
                "{}: discarding fetch response from superseded generation {}",
                self.spec.table, generation
            );
            return Ok(FetchOutcome::Stale);
        }

        match result {
            Ok(values) => {
                let mut items = Vec::with_capacity(values.len());
                for value in values {
                    match serde_json::from_value::<R>(value) {
                        Ok(item) => items.push(item),
                        Err(e) => warn!("{}: dropping malformed row: {}", self.spec.table, e),
                    }
                }
                self.install_snapshot(items).await;

                let drained = {
                    let mut buffer = self.inner.buffer.lock().await;
                    buffer.hold = false;
                    std::mem::take(&mut buffer.events)
                };
                let mut needs_refetch = false;
                for event in drained {
                    match event.kind {
                        EventKind::Insert => self.apply_insert(event.record).await,
                        EventKind::Update | EventKind::Delete => {
                            if self.spec.live == LivePolicy::AppendAndRefetch {
                                needs_refetch = true;
                            }
                        }
                    }
                }

                self.inner.loading.store(false, AtomicOrdering::SeqCst);
                if needs_refetch {
                    Ok(FetchOutcome::RefetchNeeded)
                } else {
                    Ok(FetchOutcome::Applied)
                }
            }
            Err(e) => {
                // Degrade to an empty list; the caller still sees the error.
                error!("{}: fetch failed: {}", self.spec.table, e);
                self.install_snapshot(Vec::new()).await;
                {
                    let mut buffer = self.inner.buffer.lock().await;
                    buffer.hold = false;
                    buffer.events.clear();
                }
                self.inner.loading.store(false, AtomicOrdering::SeqCst);
                Err(e)
            }
        }
    }

    async fn install_snapshot(&self, items: Vec<R>) {
        *self.inner.snapshot.write().await = items;
        let _ = self.inner.changed.send(());
    }

    async fn open_feed(&self, generation: u64, scope: Option<Uuid>) -> Result<(), StoreError> {
        self.inner.subscription.lock().await.take();

        let filter = match (self.spec.scope_column, scope) {
            (Some(column), Some(id)) => Some(Filter::eq(column, id)),
            _ => None,
        };
        let mut feed = self.live.subscribe(self.spec.table, filter).await?;

        let store = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = feed.next_event().await {
                store.route_event(generation, event).await;
            }
        });
        *self.inner.subscription.lock().await = Some(SubscriptionGuard { task });
        Ok(())
    }

    async fn route_event(&self, generation: u64, event: RowEvent) {
        if generation != self.inner.generation.load(AtomicOrdering::SeqCst) {
            debug!(
                "{}: dropping event from superseded generation {}",
                self.spec.table, generation
            );
            return;
        }
        {
            let mut buffer = self.inner.buffer.lock().await;
            if buffer.hold {
                buffer.events.push(event);
                return;
            }
        }
        self.apply_event(generation, event).await;
    }

    async fn apply_event(&self, generation: u64, event: RowEvent) {
        match event.kind {
            EventKind::Insert => self.apply_insert(event.record).await,
            EventKind::Update | EventKind::Delete => {
                if self.spec.live == LivePolicy::AppendAndRefetch {
                    let scope = *self.inner.scope.lock().await;
                    if let Err(e) = self.fetch_into(generation, scope).await {
                        error!("{}: refetch after change event failed: {}", self.spec.table, e);
                    }
                }
            }
        }
    }

    /// Appends to the end of the list as delivered: no re-sort, no dedup
    /// against rows the initial fetch already returned.
    async fn apply_insert(&self, record: Value) {
        match serde_json::from_value::<R>(record) {
            Ok(item) => {
                self.inner.snapshot.write().await.push(item);
                let _ = self.inner.changed.send(());
            }
            Err(e) => warn!("{}: dropping malformed insert event: {}", self.spec.table, e),
        }
    }
}
