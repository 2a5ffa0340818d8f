// ── Statistics history ──
//
// SQLite-backed history of `StatCounters`, plus the one-time import of a
// legacy JSON record file. The import has two separate phases: a single
// transaction that clears the table and inserts every legacy record, then
// archiving the legacy file. Archiving only happens after the commit.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, params};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Aggregator;
use crate::model::StatCounters;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stats (
    apps INTEGER,
    deas INTEGER,
    organizations INTEGER,
    running_instances INTEGER,
    spaces INTEGER,
    timestamp REAL,
    total_instances INTEGER,
    users INTEGER
)";

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Legacy stats file {path:?} is not a JSON record array: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stats table already existed, legacy file {path:?} left in place")]
    MigrationConflict { path: PathBuf },

    #[error("imported {records} legacy records but could not archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        records: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("counter {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

// ── Legacy archiving ─────────────────────────────────────────────────

/// Moves a migrated legacy file out of the way.
pub trait LegacyArchiver: Send + Sync {
    /// Archive `path`, returning where it went.
    fn archive(&self, path: &Path) -> std::io::Result<PathBuf>;
}

/// Renames `<path>` to `<path>.bak`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameArchiver;

impl LegacyArchiver for RenameArchiver {
    fn archive(&self, path: &Path) -> std::io::Result<PathBuf> {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        fs::rename(path, &backup)?;
        Ok(backup)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// No legacy file at the configured path.
    NoLegacyFile,
    Migrated { records: usize, archived_to: PathBuf },
}

// ── StatsStore ───────────────────────────────────────────────────────

pub struct StatsStore {
    conn: Mutex<Connection>,
    /// Whether the `stats` table was created by this `open`.
    created: bool,
}

impl StatsStore {
    pub fn open(path: &Path) -> Result<Self, StatsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StatsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StatsError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StatsError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let existed = table_exists(&conn, "stats")?;
        conn.execute_batch(SCHEMA)?;
        if !existed {
            debug!("created stats table");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            created: !existed,
        })
    }

    pub fn created(&self) -> bool {
        self.created
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, counters: &StatCounters) -> Result<(), StatsError> {
        insert(&self.lock(), counters)
    }

    /// Every stored row at or after `since` (epoch millis), oldest first.
    pub fn list(&self, since: Option<f64>) -> Result<Vec<StatCounters>, StatsError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT apps, deas, organizations, running_instances, spaces, timestamp, \
             total_instances, users FROM stats WHERE timestamp >= ?1 ORDER BY timestamp ASC",
        )?;
        let mut rows = stmt.query(params![since.unwrap_or(f64::MIN)])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(StatCounters {
                apps: counter("apps", row.get(0)?)?,
                deas: counter("deas", row.get(1)?)?,
                organizations: counter("organizations", row.get(2)?)?,
                running_instances: counter("running_instances", row.get(3)?)?,
                spaces: counter("spaces", row.get(4)?)?,
                timestamp: row.get::<_, Option<f64>>(5)?.unwrap_or_default(),
                total_instances: counter("total_instances", row.get(6)?)?,
                users: counter("users", row.get(7)?)?,
                cells: 0,
            });
        }
        Ok(out)
    }

    /// Phase one of the legacy import: clear the table and insert every
    /// record in one transaction. Nothing is written if any insert fails.
    pub fn replace_all(&self, records: &[StatCounters]) -> Result<usize, StatsError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM stats", [])?;
        for record in records {
            insert(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Import a legacy JSON record file, once.
    ///
    /// Runs only when this `open` created the table. If the table already
    /// existed and a legacy file is still present, nothing is imported and
    /// `MigrationConflict` is returned. If archiving fails after the
    /// commit, the records stay imported, the file stays where it was, and
    /// `Archive` is returned.
    pub fn migrate_legacy(
        &self,
        path: &Path,
        archiver: &dyn LegacyArchiver,
    ) -> Result<MigrationOutcome, StatsError> {
        if !path.exists() {
            return Ok(MigrationOutcome::NoLegacyFile);
        }
        if !self.created {
            return Err(StatsError::MigrationConflict {
                path: path.to_path_buf(),
            });
        }

        let raw = fs::read(path).map_err(|source| StatsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<StatCounters> =
            serde_json::from_slice(&raw).map_err(|source| StatsError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let records = self.replace_all(&records)?;
        debug!(records, "legacy stats imported");

        let archived_to = archiver.archive(path).map_err(|source| StatsError::Archive {
            path: path.to_path_buf(),
            records,
            source,
        })?;
        info!(records, archived_to = %archived_to.display(), "legacy stats file migrated");

        Ok(MigrationOutcome::Migrated {
            records,
            archived_to,
        })
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StatsError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert(conn: &Connection, c: &StatCounters) -> Result<(), StatsError> {
    let int = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO stats (apps, deas, organizations, running_instances, spaces, timestamp, \
         total_instances, users) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            int(c.apps),
            int(c.deas),
            int(c.organizations),
            int(c.running_instances),
            int(c.spaces),
            c.timestamp,
            int(c.total_instances),
            int(c.users),
        ],
    )?;
    Ok(())
}

fn counter(field: &'static str, value: Option<i64>) -> Result<u64, StatsError> {
    let value = value.unwrap_or(0);
    u64::try_from(value).map_err(|_| StatsError::OutOfRange { field, value })
}

// ── Historian ────────────────────────────────────────────────────────

/// Append the aggregator's current counters to `store` every `period`
/// until `cancel` fires. Writes run on the blocking pool.
pub fn spawn_historian(
    store: Arc<StatsStore>,
    aggregator: Aggregator,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // views are still filling on the first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let counters = aggregator.current_statistics();
                    let store = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || store.append(&counters)).await {
                        Ok(Ok(())) => debug!("stats recorded"),
                        Ok(Err(e)) => warn!(error = %e, "failed to record stats"),
                        Err(e) => warn!(error = %e, "stats writer panicked"),
                    }
                }
            }
        }
        debug!("historian stopped");
    })
}
