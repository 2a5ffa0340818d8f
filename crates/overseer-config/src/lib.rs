//! Configuration for the overseer daemon and CLI.
//!
//! One TOML file plus `OVERSEER_` environment overrides, client-secret
//! resolution (env + keyring + plaintext), and translation to
//! `overseer_core::EngineConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use overseer_core::{
    ClientCredentials, EngineConfig, FirehoseConfig, RestSourceConfig, StatsConfig,
    TlsVerification,
};

/// Keyring service name secrets are stored under.
pub const KEYRING_SERVICE: &str = "overseer";

/// Prefix of environment overrides. Nested keys are separated by `__`,
/// e.g. `OVERSEER_CONTROL_PLANE__URL`.
pub const ENV_PREFIX: &str = "OVERSEER_";

const CLIENT_SECRET_ENV: &str = "OVERSEER_CLIENT_SECRET";
const REDACTED: &str = "****";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no client secret configured for client '{client_id}'")]
    NoCredentials { client_id: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<RestSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<RestSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<RestSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firehose: Option<Firehose>,

    /// OAuth client used against the identity server's token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,

    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Seconds allowed for one source fetch.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Seconds `run` waits for in-flight polls on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Accept invalid TLS certificates (lab deployments).
    #[serde(default)]
    pub insecure: bool,

    /// Custom CA certificate for every REST source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Append-only audit log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_file: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            insecure: false,
            ca_cert: None,
            audit_file: None,
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    10
}

/// A polled REST source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestSource {
    /// Base URL, e.g. "https://api.sys.example.com".
    pub url: String,

    /// Poll interval in seconds. Zero polls only on demand.
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
}

fn default_poll_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Firehose {
    /// WebSocket URL, e.g. "wss://doppler.sys.example.com/firehose/overseer".
    pub url: String,

    /// Seconds between snapshots of the folded stream.
    #[serde(default = "default_firehose_interval")]
    pub interval: u64,

    /// Seconds after which an entry with no new envelope is dropped.
    #[serde(default = "default_stale_after")]
    pub stale_after: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
}

fn default_firehose_interval() -> u64 {
    10
}
fn default_stale_after() -> u64 {
    120
}
fn default_reconnect_delay() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub client_id: String,

    /// Client secret (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Environment variable holding the client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Stats {
    /// SQLite database holding the `stats` table.
    pub database: PathBuf,

    /// Legacy JSON history imported once into a new table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_file: Option<PathBuf>,

    /// Seconds between recorded samples.
    #[serde(default = "default_stats_interval")]
    pub interval: u64,
}

fn default_stats_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Log {
    /// Operational log file, written next to stderr output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Write the log file as JSON lines.
    #[serde(default)]
    pub json: bool,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "overseer", "overseer").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("overseer");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file, then `OVERSEER_` environment overrides.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the config from `path`, or from [`config_path`] when `None`.
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

/// The config as TOML with every plaintext secret masked.
pub fn render_redacted(cfg: &Config) -> Result<String, ConfigError> {
    let mut cfg = cfg.clone();
    if let Some(creds) = cfg.credentials.as_mut() {
        if creds.client_secret.is_some() {
            creds.client_secret = Some(REDACTED.into());
        }
    }
    Ok(toml::to_string_pretty(&cfg)?)
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(client_id: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{client_id}/client-secret"))
}

/// Resolve the client secret: env var, then system keyring, then the
/// plaintext value in the file.
pub fn resolve_client_secret(creds: &Credentials) -> Result<SecretString, ConfigError> {
    // 1. Named env var, then the default one
    let env_name = creds.client_secret_env.as_deref().unwrap_or(CLIENT_SECRET_ENV);
    if let Ok(val) = std::env::var(env_name) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(secret) = keyring_entry(&creds.client_id).and_then(|e| e.get_password()) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref secret) = creds.client_secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials {
        client_id: creds.client_id.clone(),
    })
}

/// Store a client secret in the system keyring.
pub fn store_client_secret(client_id: &str, secret: &str) -> Result<(), ConfigError> {
    if secret.is_empty() {
        return Err(ConfigError::Validation {
            field: "client_secret".into(),
            reason: "value cannot be empty".into(),
        });
    }
    keyring_entry(client_id)?.set_password(secret)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

fn rest_source(field: &str, source: Option<&RestSource>) -> Result<Option<RestSourceConfig>, ConfigError> {
    source
        .map(|s| {
            Ok(RestSourceConfig {
                url: parse_url(&format!("{field}.url"), &s.url)?,
                interval: Duration::from_secs(s.interval),
            })
        })
        .transpose()
}

fn tls(defaults: &Defaults) -> TlsVerification {
    if defaults.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = defaults.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    }
}

/// Build an `EngineConfig`, resolving the client secret if credentials
/// are configured.
pub fn to_engine_config(cfg: &Config) -> Result<EngineConfig, ConfigError> {
    if cfg.defaults.request_timeout == 0 {
        return Err(ConfigError::Validation {
            field: "defaults.request_timeout".into(),
            reason: "must be at least one second".into(),
        });
    }

    let credentials = match &cfg.credentials {
        Some(_) if cfg.identity.is_none() => {
            return Err(ConfigError::Validation {
                field: "credentials".into(),
                reason: "client credentials require an [identity] source".into(),
            });
        }
        Some(creds) => Some(ClientCredentials {
            client_id: creds.client_id.clone(),
            client_secret: resolve_client_secret(creds)?,
        }),
        None => None,
    };

    let firehose = cfg
        .firehose
        .as_ref()
        .map(|f| {
            Ok::<_, ConfigError>(FirehoseConfig {
                url: parse_url("firehose.url", &f.url)?,
                interval: Duration::from_secs(f.interval),
                stale_after: Duration::from_secs(f.stale_after),
                reconnect_delay: Duration::from_secs(f.reconnect_delay),
            })
        })
        .transpose()?;

    let stats = cfg.stats.as_ref().map(|s| StatsConfig {
        database: s.database.clone(),
        legacy_file: s.legacy_file.clone(),
        interval: Duration::from_secs(s.interval),
    });

    Ok(EngineConfig {
        control_plane: rest_source("control_plane", cfg.control_plane.as_ref())?,
        identity: rest_source("identity", cfg.identity.as_ref())?,
        telemetry: rest_source("telemetry", cfg.telemetry.as_ref())?,
        firehose,
        credentials,
        tls: tls(&cfg.defaults),
        request_timeout: Duration::from_secs(cfg.defaults.request_timeout),
        shutdown_timeout: Duration::from_secs(cfg.defaults.shutdown_timeout),
        stats,
        audit_file: cfg.defaults.audit_file.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn load(toml: &str) -> Config {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();
        load_config(Some(&path)).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.defaults.request_timeout, 30);
        assert!(cfg.control_plane.is_none());

        let engine = to_engine_config(&cfg).unwrap();
        assert!(engine.control_plane.is_none());
        assert_eq!(engine.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn sources_translate_with_default_intervals() {
        let cfg = load(
            r#"
            [defaults]
            request_timeout = 5
            ca_cert = "/etc/overseer/ca.pem"

            [control_plane]
            url = "https://api.sys.example.com"

            [telemetry]
            url = "http://nats.example.com:9022"
            interval = 0

            [firehose]
            url = "wss://doppler.sys.example.com/firehose/overseer"
            stale_after = 60

            [stats]
            database = "/var/lib/overseer/store.db"
            "#,
        );

        let engine = to_engine_config(&cfg).unwrap();
        let cp = engine.control_plane.unwrap();
        assert_eq!(cp.url.as_str(), "https://api.sys.example.com/");
        assert_eq!(cp.interval, Duration::from_secs(30));
        assert_eq!(engine.telemetry.unwrap().interval, Duration::ZERO);

        let firehose = engine.firehose.unwrap();
        assert_eq!(firehose.interval, Duration::from_secs(10));
        assert_eq!(firehose.stale_after, Duration::from_secs(60));

        assert_eq!(engine.stats.unwrap().interval, Duration::from_secs(300));
        assert_eq!(engine.request_timeout, Duration::from_secs(5));
        assert_eq!(
            engine.tls,
            TlsVerification::CustomCa(PathBuf::from("/etc/overseer/ca.pem"))
        );
    }

    #[test]
    fn invalid_url_names_the_field() {
        let cfg = load(
            r#"
            [identity]
            url = "not a url"
            "#,
        );
        let err = to_engine_config(&cfg).unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "identity.url"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn credentials_require_an_identity_source() {
        let cfg = load(
            r#"
            [credentials]
            client_id = "overseer"
            client_secret = "s3cret"
            "#,
        );
        assert!(matches!(
            to_engine_config(&cfg),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn plaintext_secret_is_the_last_resort() {
        let creds = Credentials {
            client_id: "overseer-test-client-7c1e".into(),
            client_secret: Some("s3cret".into()),
            client_secret_env: Some("OVERSEER_TEST_SECRET_UNSET_7C1E".into()),
        };
        let secret = resolve_client_secret(&creds).unwrap();
        assert_eq!(secret.expose_secret(), "s3cret");

        let creds = Credentials {
            client_secret: None,
            ..creds
        };
        assert!(matches!(
            resolve_client_secret(&creds),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn redacted_render_masks_the_secret() {
        let cfg = Config {
            credentials: Some(Credentials {
                client_id: "overseer".into(),
                client_secret: Some("s3cret".into()),
                client_secret_env: None,
            }),
            ..Config::default()
        };
        let rendered = render_redacted(&cfg).unwrap();
        assert!(rendered.contains("client_secret = \"****\""));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn empty_secret_is_not_stored() {
        assert!(matches!(
            store_client_secret("overseer", ""),
            Err(ConfigError::Validation { .. })
        ));
    }
}
