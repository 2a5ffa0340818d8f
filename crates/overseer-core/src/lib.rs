//! Aggregation and refresh engine behind the platform admin console.
//!
//! Several loosely consistent sources are merged into one queryable view
//! per resource type:
//!
//! - **[`Aggregator`]**: polls every [`SourceClient`] on its own interval,
//!   publishes each result into the source cache as a new
//!   [`SourceSet`], and rebuilds the views that depend on the polled source.
//!   A failed poll keeps the previous records and flips `connected` off.
//!
//! - **[`builder`]**: pure joins from one `SourceSet` to one
//!   [`ViewModel`]. Table rows and detail objects come out of the same pass.
//!
//! - **[`ViewStore`]**: latest view per resource type behind `arc-swap`;
//!   a build from an older source epoch never replaces a newer one.
//!
//! - **[`Dispatcher`]**: validates mutations against the installed views,
//!   forwards them to the control plane or identity server through a
//!   [`MutationBackend`], then re-polls the owning sources before returning.
//!
//! - **[`AdminSurface`]**: path routing, status codes and audit logging
//!   for the console's JSON endpoints.
//!
//! - **[`stats`]**: SQLite history of [`StatCounters`] and the one-time
//!   legacy file import.

pub mod audit;
pub mod builder;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod source;
pub mod stats;
pub mod store;
pub mod surface;

// ── Primary re-exports ──────────────────────────────────────────────
pub use audit::{
    AuditEvent, AuditLogger, AuditSink, FileSink, MemorySink, TracingSink, append_only,
};
pub use cache::SourceCache;
pub use config::{
    ClientCredentials, EngineConfig, FirehoseConfig, RestSourceConfig, StatsConfig,
    TlsVerification,
};
pub use dispatch::{ApiBackend, BackingCall, Dispatcher, MutationBackend, Operation, Verb};
pub use engine::Aggregator;
pub use error::CoreError;
pub use source::{Connections, SourceClient, connect};
pub use stats::{
    LegacyArchiver, MigrationOutcome, RenameArchiver, StatsError, StatsStore, spawn_historian,
};
pub use store::ViewStore;
pub use surface::{AdminSurface, Request, Response};

pub use model::{
    Collection, NaturalKey, ResourceType, SourceKind, SourceRecord, SourceSet, SourceSnapshot,
    StatCounters, ViewEntry, ViewModel,
};
