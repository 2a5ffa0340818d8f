//! CLI error types with miette diagnostics.
//!
//! Maps core, stats and config errors into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use overseer_config::ConfigError;
use overseer_core::{CoreError, StatsError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("No sources configured")]
    #[diagnostic(
        code(overseer::no_sources),
        help(
            "Add at least one of [control_plane], [identity], [telemetry] or [firehose]\n\
             Expected config at: {path}"
        )
    )]
    NoSources { path: String },

    #[error("Statistics are not configured")]
    #[diagnostic(
        code(overseer::no_stats),
        help("Add a [stats] section with a database path, or pass --database.")
    )]
    StatsNotConfigured,

    #[error(transparent)]
    #[diagnostic(
        code(overseer::config),
        help("Check the config file with: overseer config show")
    )]
    Config(#[from] ConfigError),

    // ── Sources ──────────────────────────────────────────────────────

    #[error("Could not reach {source_kind}: {reason}")]
    #[diagnostic(
        code(overseer::connection_failed),
        help("Check the source URL and that it is reachable from this host.")
    )]
    ConnectionFailed { source_kind: String, reason: String },

    #[error("Fetch from {source_kind} timed out after {seconds}s")]
    #[diagnostic(
        code(overseer::timeout),
        help("Raise [defaults].request_timeout or check the source's responsiveness.")
    )]
    Timeout { source_kind: String, seconds: u64 },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Unknown resource type '{name}'")]
    #[diagnostic(code(overseer::unknown_resource), help("Known resource types: {known}"))]
    UnknownResource { name: String, known: String },

    #[error("{resource} '{key}' not found")]
    #[diagnostic(
        code(overseer::not_found),
        help("Run: overseer view {resource} to see available rows")
    )]
    NotFound { resource: String, key: String },

    // ── Operations ───────────────────────────────────────────────────

    #[error("Backing API answered {status}: {body}")]
    #[diagnostic(code(overseer::backing_failed))]
    BackingFailed { status: u16, body: String },

    #[error("Request failed with status {status}: {body}")]
    #[diagnostic(code(overseer::request_failed))]
    RequestFailed { status: u16, body: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(overseer::validation))]
    Validation { field: String, reason: String },

    #[error("{message}")]
    #[diagnostic(code(overseer::core))]
    Core { message: String },

    // ── Persistence ──────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(overseer::stats))]
    Stats(#[from] StatsError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } | Self::UnknownResource { .. } => exit_code::NOT_FOUND,
            Self::RequestFailed { status: 404, .. } => exit_code::NOT_FOUND,
            Self::BackingFailed { status, .. } | Self::RequestFailed { status, .. }
                if matches!(status, 409 | 422) =>
            {
                exit_code::CONFLICT
            }
            Self::Validation { .. } | Self::NoSources { .. } | Self::StatsNotConfigured => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SourceUnreachable {
                source_kind,
                reason,
            } => CliError::ConnectionFailed {
                source_kind: source_kind.to_string(),
                reason,
            },

            CoreError::Timeout {
                source_kind,
                timeout_secs,
            } => CliError::Timeout {
                source_kind: source_kind.to_string(),
                seconds: timeout_secs,
            },

            CoreError::NotFound { resource, key } => CliError::NotFound { resource, key },

            CoreError::BackingOperationFailed { status, body } => {
                CliError::BackingFailed { status, body }
            }

            CoreError::MalformedInput { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Stats(e) => CliError::Stats(e),

            other @ (CoreError::RefreshAfterMutation { .. }
            | CoreError::Unsupported { .. }
            | CoreError::Config { .. }
            | CoreError::Internal(_)) => CliError::Core {
                message: other.to_string(),
            },
        }
    }
}
