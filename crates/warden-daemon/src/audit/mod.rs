//! Append-only operational logs.
//!
//! The audit log records every lifecycle decision the supervisor makes as
//! one human-readable line per event. The modification log records launch
//! spec rewrites as one JSON object per line so they can be replayed or
//! diffed later. Both logs are append-only and survive restarts.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use warden_types::{ModificationRecord, WardenError, WardenResult};

/// A single auditable supervisor event.
#[derive(Clone, Debug)]
pub enum AuditEvent {
    SupervisorStarted { workers: usize },
    StateRestored { workers: usize, cycle_count: u64 },
    WorkerRegistered { worker: String, critical: bool },
    WorkerStarted { worker: String, pid: u32 },
    LaunchFailed { worker: String, reason: String },
    WorkerStopped { worker: String, exit_code: Option<i32>, forced: bool },
    StopAbandoned { worker: String },
    WorkerCrashed { worker: String, exit_code: Option<i32>, consecutive: u32 },
    RestartScheduled { worker: String, backoff_secs: u64 },
    WorkerParked { worker: String },
    ReflectionSelected { worker: String },
    ReflectionAnalyzed { worker: String, recommendation: String },
    SpecModified { worker: String },
    ReflectionCompleted { worker: String, modified: bool },
    ReflectionAborted { worker: String, reason: String },
    CycleCompleted { cycle: u64, started: usize, stopped: usize },
    SupervisorStopping,
    SupervisorStopped { cycle_count: u64 },
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SupervisorStarted { workers } => {
                write!(f, "supervisor-started workers={}", workers)
            }
            Self::StateRestored { workers, cycle_count } => {
                write!(f, "state-restored workers={} cycle={}", workers, cycle_count)
            }
            Self::WorkerRegistered { worker, critical } => {
                write!(f, "worker-registered worker={} critical={}", worker, critical)
            }
            Self::WorkerStarted { worker, pid } => {
                write!(f, "worker-started worker={} pid={}", worker, pid)
            }
            Self::LaunchFailed { worker, reason } => {
                write!(f, "launch-failed worker={} reason={}", worker, reason)
            }
            Self::WorkerStopped { worker, exit_code, forced } => {
                write!(
                    f,
                    "worker-stopped worker={} exit={} forced={}",
                    worker,
                    fmt_exit(*exit_code),
                    forced
                )
            }
            Self::StopAbandoned { worker } => {
                write!(f, "stop-abandoned worker={}", worker)
            }
            Self::WorkerCrashed { worker, exit_code, consecutive } => {
                write!(
                    f,
                    "worker-crashed worker={} exit={} consecutive={}",
                    worker,
                    fmt_exit(*exit_code),
                    consecutive
                )
            }
            Self::RestartScheduled { worker, backoff_secs } => {
                write!(f, "restart-scheduled worker={} backoff={}s", worker, backoff_secs)
            }
            Self::WorkerParked { worker } => write!(f, "worker-parked worker={}", worker),
            Self::ReflectionSelected { worker } => {
                write!(f, "reflection-selected worker={}", worker)
            }
            Self::ReflectionAnalyzed { worker, recommendation } => {
                write!(
                    f,
                    "reflection-analyzed worker={} recommendation={}",
                    worker, recommendation
                )
            }
            Self::SpecModified { worker } => write!(f, "spec-modified worker={}", worker),
            Self::ReflectionCompleted { worker, modified } => {
                write!(f, "reflection-completed worker={} modified={}", worker, modified)
            }
            Self::ReflectionAborted { worker, reason } => {
                write!(f, "reflection-aborted worker={} reason={}", worker, reason)
            }
            Self::CycleCompleted { cycle, started, stopped } => {
                write!(
                    f,
                    "cycle-completed cycle={} started={} stopped={}",
                    cycle, started, stopped
                )
            }
            Self::SupervisorStopping => write!(f, "supervisor-stopping"),
            Self::SupervisorStopped { cycle_count } => {
                write!(f, "supervisor-stopped cycle={}", cycle_count)
            }
        }
    }
}

fn fmt_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

/// Append-only audit log, one timestamped line per event.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Opens the log for appending, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> WardenResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WardenError::Audit(format!("Failed to create log dir: {}", e)))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WardenError::Audit(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one event. Write failures are logged and swallowed so a full
    /// disk never takes the supervisor down with it.
    pub fn record(&self, event: AuditEvent) {
        let line = format!(
            "[{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            event
        );

        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            warn!("Audit write to {:?} failed: {}", self.path, e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append-only JSONL log of launch spec rewrites.
pub struct ModificationLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ModificationLog {
    pub fn open(path: impl AsRef<Path>) -> WardenResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WardenError::Audit(format!("Failed to create log dir: {}", e)))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                WardenError::Audit(format!("Failed to open modification log: {}", e))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one record as a single JSON line.
    pub fn append(&self, record: &ModificationRecord) -> WardenResult<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| WardenError::Audit(format!("Failed to encode record: {}", e)))?;

        let mut file = self.file.lock();
        writeln!(file, "{}", line)
            .and_then(|_| file.flush())
            .map_err(|e| WardenError::Audit(format!("Failed to append record: {}", e)))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::LaunchSpec;

    #[test]
    fn test_audit_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.log");

        let log = AuditLog::open(&path).unwrap();
        log.record(AuditEvent::SupervisorStarted { workers: 3 });
        log.record(AuditEvent::WorkerStarted {
            worker: "fetcher".to_string(),
            pid: 4242,
        });
        log.record(AuditEvent::WorkerCrashed {
            worker: "fetcher".to_string(),
            exit_code: None,
            consecutive: 2,
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("supervisor-started workers=3"));
        assert!(lines[1].contains("worker-started worker=fetcher pid=4242"));
        assert!(lines[2].contains("exit=signal consecutive=2"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn test_audit_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        {
            let log = AuditLog::open(&path).unwrap();
            log.record(AuditEvent::SupervisorStopping);
        }
        {
            let log = AuditLog::open(&path).unwrap();
            log.record(AuditEvent::SupervisorStopped { cycle_count: 7 });
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_modification_log_is_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modifications.jsonl");

        let log = ModificationLog::open(&path).unwrap();
        let record = ModificationRecord {
            timestamp: Utc::now(),
            worker_name: "indexer".to_string(),
            reason_summary: "reduce batch size".to_string(),
            before: LaunchSpec::new("/usr/bin/indexer").with_args(["--batch", "100"]),
            after: LaunchSpec::new("/usr/bin/indexer").with_args(["--batch", "10"]),
        };
        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: ModificationRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.worker_name, "indexer");
        assert!(lines[0].contains("\"workerName\""));
        assert!(lines[0].contains("\"reasonSummary\""));
    }
}
