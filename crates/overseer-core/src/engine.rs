// ── Aggregation engine ──
//
// Drives every source on its own interval, publishes each poll result
// into the source cache, and rebuilds the views that depend on the polled
// source. Reads go straight to the view store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::{self, columns};
use crate::cache::SourceCache;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{
    NaturalKey, ResourceType, SourceKind, SourceSet, StatCounters, ViewModel, epoch_millis,
};
use crate::source::SourceClient;
use crate::store::ViewStore;

const STATE_STARTED: &str = "STARTED";

// ── Aggregator ───────────────────────────────────────────────────────

/// The engine handle. Cheaply cloneable via `Arc<AggregatorInner>`.
///
/// Construct with [`new`](Self::new), call [`start`](Self::start) to run
/// the initial poll and spawn the poll tasks, and
/// [`shutdown`](Self::shutdown) to stop them.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    sources: BTreeMap<SourceKind, Polled>,
    cache: SourceCache,
    store: Arc<ViewStore>,
    request_timeout: Duration,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// One source plus its poll schedule.
struct Polled {
    client: Arc<dyn SourceClient>,
    /// `None` or zero: polled only on demand.
    interval: Option<Duration>,
    /// Serializes polls of this source; other sources are unaffected.
    lock: Mutex<()>,
}

impl Aggregator {
    /// Engine over `sources`. Poll intervals come from `config`; a source
    /// without an interval there is only polled on demand.
    pub fn new(config: &EngineConfig, sources: Vec<Arc<dyn SourceClient>>) -> Self {
        let sources: BTreeMap<SourceKind, Polled> = sources
            .into_iter()
            .map(|client| {
                let kind = client.kind();
                let polled = Polled {
                    client,
                    interval: config.interval(kind),
                    lock: Mutex::new(()),
                };
                (kind, polled)
            })
            .collect();

        Self {
            inner: Arc::new(AggregatorInner {
                cache: SourceCache::new(sources.keys().copied()),
                sources,
                store: Arc::new(ViewStore::new()),
                request_timeout: config.request_timeout,
                shutdown_timeout: config.shutdown_timeout,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<ViewStore> {
        &self.inner.store
    }

    /// The source set the current views were built from.
    pub fn sources_snapshot(&self) -> Arc<SourceSet> {
        self.inner.cache.load()
    }

    pub fn has_source(&self, kind: SourceKind) -> bool {
        self.inner.sources.contains_key(&kind)
    }

    /// Cancelled by [`shutdown`](Self::shutdown). Background work tied to
    /// the engine's lifetime should watch a child of this token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Poll every source once, concurrently, then spawn one periodic task
    /// per source. Calling it again after a successful start is a no-op.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("aggregator already started");
            return;
        }

        let kinds: Vec<SourceKind> = self.inner.sources.keys().copied().collect();
        info!(sources = kinds.len(), "initial poll");
        let results = join_all(kinds.iter().map(|&kind| self.poll(kind))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, "some sources failed their initial poll");
        }

        // Views whose sources are all unconfigured still get an entry.
        self.rebuild_all();

        for (&kind, polled) in &self.inner.sources {
            let Some(period) = polled.interval.filter(|p| !p.is_zero()) else {
                debug!(source = %kind, "no poll interval, polling on demand only");
                continue;
            };
            let cancel = self.inner.cancel.child_token();
            handles.push(tokio::spawn(poll_task(self.clone(), kind, period, cancel)));
        }
        debug!(tasks = handles.len(), "poll tasks spawned");
    }

    /// Cancel the poll tasks and wait for in-flight polls, bounded by the
    /// shutdown timeout. Tasks still running at the deadline are aborted.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        let deadline = tokio::time::Instant::now() + self.inner.shutdown_timeout;
        let mut aborted = 0_usize;

        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            warn!(aborted, "poll tasks did not stop in time");
        }
        debug!("aggregator stopped");
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Fetch `kind` once and rebuild every view depending on it.
    ///
    /// Success replaces the source's snapshot. Failure keeps the previous
    /// records, marks the source disconnected, and is returned after the
    /// rebuild so dependent views already show `connected = false`.
    pub async fn poll(&self, kind: SourceKind) -> Result<usize, CoreError> {
        let polled = self.inner.sources.get(&kind).ok_or_else(|| CoreError::Config {
            message: format!("source {kind} is not configured"),
        })?;
        let _guard = polled.lock.lock().await;

        let timeout = self.inner.request_timeout;
        let outcome = match tokio::time::timeout(timeout, polled.client.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                source_kind: kind,
                timeout_secs: timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(records) => {
                let count = records.len();
                let set = self.inner.cache.publish_success(kind, records);
                debug!(source = %kind, records = count, epoch = set.epoch, "poll complete");
                self.rebuild_dependents(kind, &set);
                Ok(count)
            }
            Err(e) => {
                warn!(source = %kind, error = %e, "poll failed");
                let set = self.inner.cache.publish_failure(kind, &e.to_string());
                self.rebuild_dependents(kind, &set);
                Err(e)
            }
        }
    }

    /// Rebuild every view from the current source set.
    pub fn rebuild_all(&self) {
        let set = self.inner.cache.load();
        self.rebuild(ResourceType::iter(), &set);
    }

    fn rebuild_dependents(&self, kind: SourceKind, set: &SourceSet) {
        self.rebuild(ResourceType::iter().filter(|r| r.depends_on(kind)), set);
    }

    fn rebuild(&self, resources: impl Iterator<Item = ResourceType>, set: &SourceSet) {
        for resource in resources {
            let model = builder::build(resource, set);
            let rows = model.len();
            if self.inner.store.replace(model) {
                debug!(%resource, rows, generation = set.epoch, "view rebuilt");
            }
        }
    }

    /// Drop a locally held record of `kind`, both from the client's own
    /// state and from the cached snapshot, then rebuild its dependents.
    /// Returns whether anything was removed.
    pub fn evict(&self, kind: SourceKind, key: &NaturalKey) -> bool {
        let from_client = self
            .inner
            .sources
            .get(&kind)
            .is_some_and(|p| p.client.evict(key));

        match self.inner.cache.evict(kind, key) {
            Some(set) => {
                self.rebuild_dependents(kind, &set);
                true
            }
            None => from_client,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn view(&self, resource: ResourceType) -> Arc<ViewModel> {
        self.inner.store.get(resource)
    }

    /// Detail of one row, from the same view generation as the table.
    pub fn detail(&self, resource: ResourceType, key: &str) -> Result<Map<String, Value>, CoreError> {
        self.view(resource)
            .detail(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                resource: resource.to_string(),
                key: key.to_owned(),
            })
    }

    /// Platform counters computed from the installed views.
    pub fn current_statistics(&self) -> StatCounters {
        let store = &self.inner.store;
        let apps = store.get(ResourceType::Applications);

        let mut total_instances = 0_u64;
        let mut running_instances = 0_u64;
        for entry in apps.entries.values() {
            let cell = |i: usize| entry.cells.get(i).and_then(Value::as_u64).unwrap_or(0);
            if entry.cells.get(columns::APP_STATE).and_then(Value::as_str) == Some(STATE_STARTED) {
                total_instances += cell(columns::APP_INSTANCES);
            }
            running_instances += cell(columns::APP_RUNNING_INSTANCES);
        }

        let rows = |resource| u64::try_from(store.get(resource).len()).unwrap_or(u64::MAX);
        StatCounters {
            apps: u64::try_from(apps.len()).unwrap_or(u64::MAX),
            cells: rows(ResourceType::Cells),
            deas: rows(ResourceType::Deas),
            organizations: rows(ResourceType::Organizations),
            running_instances,
            spaces: rows(ResourceType::Spaces),
            total_instances,
            users: rows(ResourceType::Users),
            timestamp: epoch_millis(chrono::Utc::now()),
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn poll_task(aggregator: Aggregator, kind: SourceKind, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // the initial poll already ran

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                // Failures are logged and published by `poll` itself.
                let _ = aggregator.poll(kind).await;
            }
        }
    }
    debug!(source = %kind, "poll task stopped");
}
