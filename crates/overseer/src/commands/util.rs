//! Shared helpers for command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use overseer_config::Config;
use overseer_core::{Aggregator, EngineConfig, MutationBackend, ResourceType};
use strum::IntoEnumIterator;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A started engine plus the pieces needed to mutate and stop it.
pub struct Engine {
    pub aggregator: Aggregator,
    pub backend: Arc<dyn MutationBackend>,
    cancel: CancellationToken,
}

impl Engine {
    /// Stop the poll tasks, then the firehose reader.
    pub async fn shutdown(self) {
        self.aggregator.shutdown().await;
        self.cancel.cancel();
    }
}

/// Convert the file config, refusing one with no sources at all.
pub fn engine_config(cfg: &Config, global: &GlobalOpts) -> Result<EngineConfig, CliError> {
    let config = overseer_config::to_engine_config(cfg)?;
    if config.control_plane.is_none()
        && config.identity.is_none()
        && config.telemetry.is_none()
        && config.firehose.is_none()
    {
        return Err(CliError::NoSources {
            path: config_file(global).display().to_string(),
        });
    }
    Ok(config)
}

/// Connect every configured source and run the first poll round.
pub async fn start_engine(config: &EngineConfig) -> Result<Engine, CliError> {
    let cancel = CancellationToken::new();
    let connections = overseer_core::connect(config, &cancel)?;
    let aggregator = Aggregator::new(config, connections.sources);
    aggregator.start().await;

    let backend: Arc<dyn MutationBackend> = Arc::new(connections.backend);
    Ok(Engine {
        aggregator,
        backend,
        cancel,
    })
}

/// The config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(overseer_config::config_path)
}

/// Parse "applications" as well as the console's "applications_view_model".
pub fn parse_resource(name: &str) -> Result<ResourceType, CliError> {
    name.parse::<ResourceType>()
        .ok()
        .or_else(|| ResourceType::from_view_segment(name))
        .ok_or_else(|| CliError::UnknownResource {
            name: name.to_owned(),
            known: ResourceType::iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}
