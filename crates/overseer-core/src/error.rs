// ── Core error types ──
//
// Errors surfaced by the aggregation engine and the request surface.
// Source-level failures are absorbed by the poller and only show up as a
// `connected = false` flag; everything here is what an operation or a
// lookup hands back to its caller. The `From<overseer_api::Error>` impl
// keeps the backing API's status and raw body for forwarding.

use thiserror::Error;

use crate::model::SourceKind;
use crate::stats::StatsError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Source errors ────────────────────────────────────────────────
    #[error("Source {source_kind} unreachable: {reason}")]
    SourceUnreachable {
        source_kind: SourceKind,
        reason: String,
    },

    #[error("Fetch from {source_kind} timed out after {timeout_secs}s")]
    Timeout {
        source_kind: SourceKind,
        timeout_secs: u64,
    },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("{resource} not found: {key}")]
    NotFound { resource: String, key: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Backing operation failed with status {status}")]
    BackingOperationFailed {
        status: u16,
        /// Raw response body, forwarded unchanged.
        body: String,
    },

    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Operation succeeded but refreshing {source_kind} failed: {reason}")]
    RefreshAfterMutation {
        source_kind: SourceKind,
        reason: String,
    },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error(transparent)]
    Stats(#[from] StatsError),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Status code the request surface answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MalformedInput { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::BackingOperationFailed { status, .. } => *status,
            Self::Unsupported { .. } => 405,
            Self::SourceUnreachable { .. }
            | Self::Timeout { .. }
            | Self::RefreshAfterMutation { .. } => 503,
            Self::Config { .. } | Self::Stats(_) | Self::Internal(_) => 500,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<overseer_api::Error> for CoreError {
    fn from(err: overseer_api::Error) -> Self {
        match err {
            overseer_api::Error::Api { status, body, .. } => {
                CoreError::BackingOperationFailed { status, body }
            }
            overseer_api::Error::Authentication { message } => CoreError::BackingOperationFailed {
                status: 401,
                body: message,
            },
            overseer_api::Error::Transport(ref e) => match e.status() {
                Some(status) => CoreError::BackingOperationFailed {
                    status: status.as_u16(),
                    body: e.to_string(),
                },
                None => CoreError::BackingOperationFailed {
                    status: 502,
                    body: e.to_string(),
                },
            },
            overseer_api::Error::Timeout { timeout_secs } => CoreError::BackingOperationFailed {
                status: 504,
                body: format!("backing call timed out after {timeout_secs}s"),
            },
            overseer_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            overseer_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            overseer_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            err @ (overseer_api::Error::WebSocketConnect(_)
            | overseer_api::Error::WebSocketClosed { .. }
            | overseer_api::Error::StreamDisconnected) => CoreError::SourceUnreachable {
                source_kind: SourceKind::Firehose,
                reason: err.to_string(),
            },
        }
    }
}
