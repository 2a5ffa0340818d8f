// ── Runtime engine configuration ──
//
// Describes which sources to poll and how. Built by the config crate or
// by tests and handed to `Aggregator`; core never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::SourceKind;

/// TLS verification strategy shared by every REST source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (lab deployments).
    DangerAcceptInvalid,
}

/// OAuth client used for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// A polled REST source.
#[derive(Debug, Clone)]
pub struct RestSourceConfig {
    pub url: Url,
    pub interval: Duration,
}

/// The firehose WebSocket source.
#[derive(Debug, Clone)]
pub struct FirehoseConfig {
    pub url: Url,
    /// How often the folded stream state is drained into a snapshot.
    pub interval: Duration,
    /// Entries not refreshed within this window are dropped.
    pub stale_after: Duration,
    pub reconnect_delay: Duration,
}

/// Statistics historian settings.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub database: PathBuf,
    /// Legacy JSON file migrated once into a freshly created table.
    pub legacy_file: Option<PathBuf>,
    pub interval: Duration,
}

/// Configuration for one aggregation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub control_plane: Option<RestSourceConfig>,
    pub identity: Option<RestSourceConfig>,
    pub telemetry: Option<RestSourceConfig>,
    pub firehose: Option<FirehoseConfig>,
    /// Credentials for the identity server's token endpoint. Without them
    /// no `Authorization` header is sent.
    pub credentials: Option<ClientCredentials>,
    pub tls: TlsVerification,
    /// Bound on every source fetch; a timed-out fetch is a failed poll.
    pub request_timeout: Duration,
    /// How long `shutdown` waits for in-flight polls before aborting them.
    pub shutdown_timeout: Duration,
    pub stats: Option<StatsConfig>,
    /// Append-only audit log file, in addition to the `audit` tracing target.
    pub audit_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_plane: None,
            identity: None,
            telemetry: None,
            firehose: None,
            credentials: None,
            tls: TlsVerification::default(),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            stats: None,
            audit_file: None,
        }
    }
}

impl EngineConfig {
    /// Poll interval for a configured source.
    pub fn interval(&self, kind: SourceKind) -> Option<Duration> {
        match kind {
            SourceKind::ControlPlane => self.control_plane.as_ref().map(|s| s.interval),
            SourceKind::Identity => self.identity.as_ref().map(|s| s.interval),
            SourceKind::Telemetry => self.telemetry.as_ref().map(|s| s.interval),
            SourceKind::Firehose => self.firehose.as_ref().map(|s| s.interval),
        }
    }
}
