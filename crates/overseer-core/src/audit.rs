// ── Audit log ──
//
// One greppable line per accepted request:
//
//   [ {actor} ] : [ {event} ] : {message}
//
// Lines are written to every sink before the response is produced.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use strum::{AsRefStr, Display};
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::dispatch::Verb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum AuditEvent {
    Get,
    Put,
    Post,
    Delete,
    Authenticated,
}

impl From<Verb> for AuditEvent {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => Self::Get,
            Verb::Put => Self::Put,
            Verb::Post => Self::Post,
            Verb::Delete => Self::Delete,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;
}

// ── Sinks ────────────────────────────────────────────────────────────

/// Emits each line as an `info` event on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        info!(target: "audit", "{line}");
        Ok(())
    }
}

/// A never-rotating appender on `path`, creating its directory if needed.
/// Used for both the audit file and the operational log file.
pub fn append_only(path: &Path) -> io::Result<RollingFileAppender> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(io::Error::other)
}

/// Appends lines to a file, flushing after each one.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<RollingFileAppender>,
}

impl FileSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(append_only(path)?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{line}")?;
        file.flush()
    }
}

/// Keeps lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AuditSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
        Ok(())
    }
}

// ── AuditLogger ──────────────────────────────────────────────────────

pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditLogger {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    /// Tracing sink, plus an append-only file when `file` is set.
    pub fn standard(file: Option<&Path>) -> io::Result<Self> {
        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingSink)];
        if let Some(path) = file {
            sinks.push(Arc::new(FileSink::open(path)?));
        }
        Ok(Self::new(sinks))
    }

    pub fn record(&self, actor: &str, event: AuditEvent, message: &str) {
        let line = format!("[ {actor} ] : [ {event} ] : {message}");
        for sink in &self.sinks {
            if let Err(e) = sink.write_line(&line) {
                warn!(error = %e, %line, "audit sink write failed");
            }
        }
    }

    /// `path` includes the query string. A non-blank body is appended for
    /// everything but reads.
    pub fn request(&self, actor: &str, verb: Verb, path: &str, body: Option<&str>) {
        match body.filter(|b| verb != Verb::Get && !b.trim().is_empty()) {
            Some(body) => self.record(actor, verb.into(), &format!("{path}; body = {body}")),
            None => self.record(actor, verb.into(), path),
        }
    }

    pub fn authenticated(&self, actor: &str, admin: bool) {
        self.record(actor, AuditEvent::Authenticated, &format!("is admin? {admin}"));
    }
}
