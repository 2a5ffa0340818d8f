//! Long-running engine: poll every source until interrupted.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use overseer_config::Config;
use overseer_core::{
    Aggregator, MigrationOutcome, RenameArchiver, StatsConfig, StatsError, StatsStore,
    spawn_historian,
};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

use super::util;

pub async fn handle(args: &RunArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let config = util::engine_config(cfg, global)?;
    let engine = util::start_engine(&config).await?;

    let historian = match config.stats.as_ref().filter(|_| !args.no_stats) {
        Some(stats) => start_historian(stats, &engine.aggregator)?,
        None => None,
    };

    info!("engine running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    engine.shutdown().await;
    if let Some(handle) = historian {
        if let Err(e) = handle.await {
            warn!(error = %e, "historian task failed");
        }
    }
    Ok(())
}

/// Open the stats database, import any legacy file, and start recording.
fn start_historian(
    stats: &StatsConfig,
    aggregator: &Aggregator,
) -> Result<Option<JoinHandle<()>>, CliError> {
    let store = StatsStore::open(&stats.database)?;

    if let Some(legacy) = stats.legacy_file.as_deref() {
        match store.migrate_legacy(legacy, &RenameArchiver) {
            Ok(MigrationOutcome::Migrated {
                records,
                archived_to,
            }) => info!(records, archived_to = %archived_to.display(), "legacy stats imported"),
            Ok(MigrationOutcome::NoLegacyFile) => {}
            Err(e @ StatsError::MigrationConflict { .. }) => warn!(error = %e, "legacy stats skipped"),
            Err(e) => return Err(e.into()),
        }
    }

    if stats.interval.is_zero() {
        return Ok(None);
    }
    Ok(Some(spawn_historian(
        Arc::new(store),
        aggregator.clone(),
        stats.interval,
        aggregator.cancellation().child_token(),
    )))
}
