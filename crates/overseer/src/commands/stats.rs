//! Statistics command handlers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tabled::Tabled;

use overseer_config::Config;
use overseer_core::model::epoch_millis;
use overseer_core::{MigrationOutcome, RenameArchiver, StatCounters, StatsStore};

use crate::cli::{GlobalOpts, MigrateStatsArgs, StatsArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Recorded")]
    recorded: String,
    #[tabled(rename = "Orgs")]
    organizations: u64,
    #[tabled(rename = "Spaces")]
    spaces: u64,
    #[tabled(rename = "Users")]
    users: u64,
    #[tabled(rename = "Apps")]
    apps: u64,
    #[tabled(rename = "Instances")]
    total_instances: u64,
    #[tabled(rename = "Running")]
    running_instances: u64,
    #[tabled(rename = "DEAs")]
    deas: u64,
    #[tabled(rename = "Cells")]
    cells: u64,
}

impl StatsRow {
    fn new(c: &StatCounters) -> Self {
        Self {
            recorded: recorded_at(c.timestamp),
            organizations: c.organizations,
            spaces: c.spaces,
            users: c.users,
            apps: c.apps,
            total_instances: c.total_instances,
            running_instances: c.running_instances,
            deas: c.deas,
            cells: c.cells,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn recorded_at(millis: f64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis as i64).map_or_else(
        || format!("{millis}"),
        |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn handle(args: &StatsArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let database = database(args.database.as_deref(), cfg)?;
    let since = args.since.as_deref().map(cutoff).transpose()?;

    let records = StatsStore::open(&database)?.list(since)?;
    let out = output::render_list(
        &global.output,
        &records,
        StatsRow::new,
        |c| recorded_at(c.timestamp),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn migrate(args: &MigrateStatsArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let database = database(args.database.as_deref(), cfg)?;
    let legacy = args
        .legacy_file
        .clone()
        .or_else(|| cfg.stats.as_ref().and_then(|s| s.legacy_file.clone()))
        .ok_or_else(|| CliError::Validation {
            field: "legacy_file".into(),
            reason: "pass --legacy-file or set [stats].legacy_file".into(),
        })?;

    let store = StatsStore::open(&database)?;
    let message = match store.migrate_legacy(&legacy, &RenameArchiver)? {
        MigrationOutcome::Migrated {
            records,
            archived_to,
        } => format!(
            "Migrated {records} records; legacy file archived to {}",
            archived_to.display()
        ),
        MigrationOutcome::NoLegacyFile => format!("No legacy file at {}", legacy.display()),
    };
    output::print_output(&message, global.quiet);
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

fn database(flag: Option<&Path>, cfg: &Config) -> Result<PathBuf, CliError> {
    flag.map(Path::to_path_buf)
        .or_else(|| cfg.stats.as_ref().map(|s| s.database.clone()))
        .ok_or(CliError::StatsNotConfigured)
}

/// `--since 2h` as an epoch-millisecond lower bound.
fn cutoff(since: &str) -> Result<f64, CliError> {
    let invalid = |reason: String| CliError::Validation {
        field: "since".into(),
        reason,
    };
    let window = humantime::parse_duration(since).map_err(|e| invalid(e.to_string()))?;
    let window = chrono::Duration::from_std(window).map_err(|e| invalid(e.to_string()))?;
    let at = Utc::now()
        .checked_sub_signed(window)
        .ok_or_else(|| invalid(format!("'{since}' reaches before the epoch")))?;
    Ok(epoch_millis(at))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_in_the_past() {
        let now = epoch_millis(Utc::now());
        let two_hours = cutoff("2h").unwrap();
        assert!(two_hours < now);
        assert!(now - two_hours >= 7_199_000.0);
    }

    #[test]
    fn cutoff_rejects_garbage() {
        assert!(matches!(
            cutoff("yesterday-ish"),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn rows_show_wall_clock_time() {
        assert_eq!(recorded_at(0.0), "1970-01-01 00:00:00");
    }
}
