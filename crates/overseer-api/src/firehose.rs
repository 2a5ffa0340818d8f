//! Firehose event stream with fixed-delay reconnect.
//!
//! Connects to the platform's firehose WebSocket and folds every JSON
//! envelope into the latest state per emitting component
//! (`{origin, index, ip}`) and per application container
//! (`{app_guid, instance_index}`). Pollers call
//! [`FirehoseHandle::snapshot`] to drain a point-in-time copy of that
//! state; entries that have not been refreshed within the staleness
//! window are dropped at that point.
//!
//! # Example
//!
//! ```rust,ignore
//! use overseer_api::firehose::{FirehoseHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("wss://doppler.example.com/firehose/overseer")?;
//! let handle = FirehoseHandle::connect(url, ReconnectConfig::default(), cancel.clone(), None);
//!
//! let snapshot = handle.snapshot(Duration::from_secs(60))?;
//! println!("{} components, {} containers", snapshot.components.len(), snapshot.containers.len());
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;

// ── Keys and folded state ────────────────────────────────────────────

/// Identity of a component emitting envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    pub origin: String,
    pub index: String,
    pub ip: String,
}

/// Latest known state of one emitting component.
#[derive(Debug, Clone)]
pub struct ComponentState {
    pub key: ComponentKey,
    pub deployment: Option<String>,
    pub job: Option<String>,
    /// Latest value per metric name (value metrics and counter totals).
    pub metrics: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

/// Identity of one application container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    pub app_guid: String,
    pub instance_index: u64,
}

/// Latest container metric for one application instance.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub key: ContainerKey,
    /// Component that reported the container (the cell or DEA).
    pub reporter: ComponentKey,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub memory_bytes_quota: u64,
    pub disk_bytes_quota: u64,
    pub received_at: DateTime<Utc>,
}

/// Point-in-time copy of the folded firehose state.
#[derive(Debug, Clone, Default)]
pub struct FirehoseSnapshot {
    pub components: Vec<ComponentState>,
    pub containers: Vec<ContainerState>,
}

#[derive(Default)]
struct FoldState {
    components: DashMap<ComponentKey, ComponentState>,
    containers: DashMap<ContainerKey, ContainerState>,
    connected: AtomicBool,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Fixed-delay reconnect configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay between a dropped connection and the next attempt. Default: 5s.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

// ── FirehoseHandle ───────────────────────────────────────────────────

/// Handle to a running firehose reader.
///
/// Cloning shares the same folded state and background task. Call
/// [`shutdown`](Self::shutdown) to tear the task down.
#[derive(Clone)]
pub struct FirehoseHandle {
    state: Arc<FoldState>,
    cancel: CancellationToken,
}

impl FirehoseHandle {
    /// Spawn the reconnecting reader and return immediately.
    ///
    /// The first connection attempt happens asynchronously; until it
    /// succeeds, [`snapshot`](Self::snapshot) reports
    /// [`Error::StreamDisconnected`].
    pub fn connect(
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        tokens: Option<Arc<TokenProvider>>,
    ) -> Self {
        let state = Arc::new(FoldState::default());

        let task_state = Arc::clone(&state);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(url, task_state, reconnect, task_cancel, tokens).await;
        });

        Self { state, cancel }
    }

    /// Whether the stream is currently connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Drop entries older than `stale_after` and return a copy of the rest.
    pub fn snapshot(&self, stale_after: Duration) -> Result<FirehoseSnapshot, Error> {
        if !self.is_connected() {
            return Err(Error::StreamDisconnected);
        }
        Ok(self.state.drain_snapshot(stale_after))
    }

    /// Forget a component until it emits again.
    pub fn evict_component(&self, key: &ComponentKey) -> bool {
        self.state.components.remove(key).is_some()
    }

    /// Forget a container until it is reported again.
    pub fn evict_container(&self, key: &ContainerKey) -> bool {
        self.state.containers.remove(key).is_some()
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl FoldState {
    fn drain_snapshot(&self, stale_after: Duration) -> FirehoseSnapshot {
        let cutoff = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));

        if let Some(cutoff) = cutoff {
            self.components.retain(|_, c| c.received_at >= cutoff);
            self.containers.retain(|_, c| c.received_at >= cutoff);
        }

        FirehoseSnapshot {
            components: self.components.iter().map(|e| e.value().clone()).collect(),
            containers: self.containers.iter().map(|e| e.value().clone()).collect(),
        }
    }

    fn apply(&self, envelope: Envelope, now: DateTime<Utc>) {
        let Some(reporter) = envelope.component_key() else {
            tracing::trace!("envelope without origin/index/ip, skipping");
            return;
        };

        let mut entry = self
            .components
            .entry(reporter.clone())
            .or_insert_with(|| ComponentState {
                key: reporter.clone(),
                deployment: None,
                job: None,
                metrics: Map::new(),
                received_at: now,
            });
        entry.received_at = now;
        if envelope.deployment.is_some() {
            entry.deployment.clone_from(&envelope.deployment);
        }
        if envelope.job.is_some() {
            entry.job.clone_from(&envelope.job);
        }

        if let Some(metric) = envelope.value_metric {
            entry.metrics.insert(metric.name, metric.value);
        }
        if let Some(counter) = envelope.counter_event {
            entry.metrics.insert(counter.name, Value::from(counter.total));
        }
        drop(entry);

        if let Some(container) = envelope.container_metric {
            let key = ContainerKey {
                app_guid: container.application_id,
                instance_index: container.instance_index,
            };
            self.containers.insert(
                key.clone(),
                ContainerState {
                    key,
                    reporter,
                    cpu_percentage: container.cpu_percentage,
                    memory_bytes: container.memory_bytes,
                    disk_bytes: container.disk_bytes,
                    memory_bytes_quota: container.memory_bytes_quota,
                    disk_bytes_quota: container.disk_bytes_quota,
                    received_at: now,
                },
            );
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect, read, on error wait the fixed delay, reconnect.
async fn ws_loop(
    url: Url,
    state: Arc<FoldState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    tokens: Option<Arc<TokenProvider>>,
) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, &state, &cancel, tokens.as_deref()) => result,
        };
        state.connected.store(false, Ordering::Release);

        match result {
            Ok(()) => tracing::info!("firehose disconnected"),
            Err(e) => tracing::warn!(error = %e, "firehose error"),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(reconnect.delay) => {}
        }
    }

    state.connected.store(false, Ordering::Release);
    tracing::debug!("firehose loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_read(
    url: &Url,
    state: &FoldState,
    cancel: &CancellationToken,
    tokens: Option<&TokenProvider>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to firehose");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(tokens) = tokens {
        request = request.with_header("Authorization", tokens.authorization().await?);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    state.connected.store(true, Ordering::Release);
    tracing::info!("firehose connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_fold(text.as_str(), state);
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            return Err(Error::WebSocketClosed {
                                code: cf.code.into(),
                                reason: cf.reason.as_str().to_owned(),
                            });
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("firehose stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, ping, pong, raw frames
                    }
                }
            }
        }
    }
}

// ── Envelope parsing ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    deployment: Option<String>,
    #[serde(default)]
    job: Option<String>,
    #[serde(default)]
    index: Option<Value>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    value_metric: Option<ValueMetric>,
    #[serde(default)]
    counter_event: Option<CounterEvent>,
    #[serde(default)]
    container_metric: Option<ContainerMetric>,
}

#[derive(Debug, Deserialize)]
struct ValueMetric {
    name: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct CounterEvent {
    name: String,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerMetric {
    application_id: String,
    instance_index: u64,
    #[serde(default)]
    cpu_percentage: f64,
    #[serde(default)]
    memory_bytes: u64,
    #[serde(default)]
    disk_bytes: u64,
    #[serde(default)]
    memory_bytes_quota: u64,
    #[serde(default)]
    disk_bytes_quota: u64,
}

impl Envelope {
    /// Index arrives as either a string or a number depending on the
    /// emitter; both normalize to the string form.
    fn component_key(&self) -> Option<ComponentKey> {
        let index = match self.index.as_ref()? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(ComponentKey {
            origin: self.origin.clone()?,
            index,
            ip: self.ip.clone()?,
        })
    }
}

fn parse_and_fold(text: &str, state: &FoldState) {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => state.apply(envelope, Utc::now()),
        Err(e) => tracing::debug!(error = %e, "failed to parse firehose envelope"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
