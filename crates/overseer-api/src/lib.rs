// overseer-api: Async clients for the platform sources the admin console aggregates.

pub mod auth;
pub mod control_plane;
pub mod error;
pub mod firehose;
pub mod identity;
mod rest;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use auth::TokenProvider;
pub use control_plane::ControlPlaneClient;
pub use error::Error;
pub use firehose::{FirehoseHandle, FirehoseSnapshot, ReconnectConfig};
pub use identity::IdentityClient;
pub use telemetry::TelemetryClient;
pub use transport::{TlsMode, TransportConfig};

pub use reqwest::Method;
