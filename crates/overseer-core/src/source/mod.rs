// ── Source clients ──
//
// Adapters that turn each `overseer-api` client into a flat list of tagged
// `SourceRecord`s. The poller only sees the `SourceClient` trait, so tests
// substitute scripted sources freely.

mod control_plane;
mod firehose;
mod identity;
mod telemetry;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use overseer_api::{
    ControlPlaneClient, FirehoseHandle, IdentityClient, ReconnectConfig, TelemetryClient,
    TlsMode, TokenProvider, TransportConfig,
};

use crate::config::{EngineConfig, TlsVerification};
use crate::dispatch::ApiBackend;
use crate::error::CoreError;
use crate::model::{NaturalKey, SourceKind, SourceRecord};

pub use control_plane::ControlPlaneSource;
pub use firehose::FirehoseSource;
pub use identity::IdentitySource;
pub use telemetry::{STATE_OFFLINE, STATE_RUNNING, TelemetrySource};

/// A pollable source of raw records.
pub trait SourceClient: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch every record once. Any error fails the whole poll.
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<SourceRecord>, CoreError>>;

    /// Forget a record held client-side so the next fetch does not bring
    /// it back. Returns whether anything was removed.
    fn evict(&self, _key: &NaturalKey) -> bool {
        false
    }
}

/// Everything built from an `EngineConfig`: the pollable sources plus the
/// backend that mutations are forwarded to.
pub struct Connections {
    pub sources: Vec<Arc<dyn SourceClient>>,
    pub backend: ApiBackend,
}

/// Build every configured source client.
///
/// Spawns the firehose reader when a firehose is configured, so this must
/// run inside a tokio runtime. The reader stops when `cancel` fires.
pub fn connect(config: &EngineConfig, cancel: &CancellationToken) -> Result<Connections, CoreError> {
    let transport = TransportConfig {
        tls: tls_mode(&config.tls),
        timeout: config.request_timeout,
    };

    let tokens = match (&config.credentials, &config.identity) {
        (Some(creds), Some(identity)) => Some(Arc::new(TokenProvider::new(
            &identity.url,
            creds.client_id.clone(),
            creds.client_secret.clone(),
            transport.build_client()?,
        )?)),
        (Some(_), None) => {
            return Err(CoreError::Config {
                message: "client credentials require an identity server URL".into(),
            });
        }
        (None, _) => None,
    };

    let http = transport.build_client()?;
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();

    let control_plane = match &config.control_plane {
        Some(cp) => {
            let client = Arc::new(ControlPlaneClient::from_reqwest(
                cp.url.as_str(),
                http.clone(),
                tokens.clone(),
            )?);
            sources.push(Arc::new(ControlPlaneSource::new(Arc::clone(&client))));
            Some(client)
        }
        None => None,
    };

    let identity = match &config.identity {
        Some(id) => {
            let client = Arc::new(IdentityClient::from_reqwest(
                id.url.as_str(),
                http.clone(),
                tokens.clone(),
            )?);
            sources.push(Arc::new(IdentitySource::new(Arc::clone(&client))));
            Some(client)
        }
        None => None,
    };

    if let Some(tm) = &config.telemetry {
        let client = TelemetryClient::from_reqwest(tm.url.as_str(), http.clone())?;
        sources.push(Arc::new(TelemetrySource::new(client)));
    }

    if let Some(fh) = &config.firehose {
        let handle = FirehoseHandle::connect(
            fh.url.clone(),
            ReconnectConfig {
                delay: fh.reconnect_delay,
            },
            cancel.child_token(),
            tokens,
        );
        sources.push(Arc::new(FirehoseSource::new(handle, fh.stale_after)));
    }

    debug!(sources = sources.len(), "source clients built");
    Ok(Connections {
        sources,
        backend: ApiBackend::new(control_plane, identity),
    })
}

fn tls_mode(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

/// Poll failure of `kind` carrying the underlying error text.
pub(crate) fn unreachable(kind: SourceKind, err: &dyn std::fmt::Display) -> CoreError {
    CoreError::SourceUnreachable {
        source_kind: kind,
        reason: err.to_string(),
    }
}

/// Build a field map from `(name, value)` pairs.
pub(crate) fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}
