#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Duplicate worker name: {0}")]
    DuplicateName(String),

    #[error("Unknown worker: {0}")]
    NotFound(String),

    #[error("Invalid transition for worker '{worker}': {from} -> {to}")]
    InvalidTransition {
        worker: String,
        from: WorkerState,
        to: WorkerState,
    },

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Audit log error: {0}")]
    Audit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type WardenResult<T> = Result<T, WardenError>;

/// Lifecycle state of one supervised worker process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl WorkerState {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Starting may fall back to Stopped (spawn failure) or Crashed (the
    /// process died before liveness was confirmed), and Stopping may land
    /// in Crashed when a stop cannot complete; every other edge is the
    /// normal start/stop/crash/restart flow.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (*self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Starting, Crashed)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Stopping, Crashed)
                | (Crashed, Starting)
                | (Crashed, Stopped)
        )
    }

    pub fn is_terminal_for_process(&self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Crashed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopping => write!(f, "stopping"),
            WorkerState::Crashed => write!(f, "crashed"),
        }
    }
}

/// How to spawn a worker's OS process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Command line rendered for audit output.
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.program.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDefinition {
    pub name: String,
    pub launch: LaunchSpec,
    pub critical: bool,
    #[serde(default)]
    pub purpose: String,
}

impl WorkerDefinition {
    pub fn new(name: impl Into<String>, launch: LaunchSpec) -> Self {
        Self {
            name: name.into(),
            launch,
            critical: false,
            purpose: String::new(),
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }
}

/// Verdict returned by an analysis collaborator for one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub recommendation: Recommendation,
    #[serde(default)]
    pub rationale: String,
}

impl Analysis {
    pub fn none(rationale: impl Into<String>) -> Self {
        Self {
            recommendation: Recommendation::None,
            rationale: rationale.into(),
        }
    }

    pub fn modify(spec: LaunchSpec, rationale: impl Into<String>) -> Self {
        Self {
            recommendation: Recommendation::Modify(spec),
            rationale: rationale.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    None,
    Modify(LaunchSpec),
}

/// One entry in the append-only modification log, written whenever a
/// reflection pass rewrites a worker's launch spec.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRecord {
    pub timestamp: DateTime<Utc>,
    pub worker_name: String,
    pub reason_summary: String,
    pub before: LaunchSpec,
    pub after: LaunchSpec,
}

/// Per-worker slice of a persisted snapshot. Process handles never appear
/// here; a loaded record is always rehydrated into a STOPPED worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub name: String,
    pub state: WorkerState,
    pub last_transition_at: DateTime<Utc>,
    pub last_exit_code: Option<i32>,
    pub consecutive_crashes: u32,
}

/// Monotonic lifetime totals carried across supervisor restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotCounters {
    pub workers_started: u64,
    pub workers_stopped: u64,
    pub crashes_observed: u64,
    pub restarts_scheduled: u64,
    pub reflections_completed: u64,
    pub modifications_applied: u64,
}

/// Worker-state tally at the moment a snapshot was written. Derived data,
/// ignored on load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerTally {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub crashed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cycle_count: u64,
    pub workers: Vec<WorkerRecord>,
    #[serde(default)]
    pub counters: SnapshotCounters,
    #[serde(default)]
    pub summary: WorkerTally,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn tally(records: &[WorkerRecord]) -> WorkerTally {
        let mut tally = WorkerTally {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.state {
                WorkerState::Running => tally.running += 1,
                WorkerState::Crashed => tally.crashed += 1,
                _ => tally.stopped += 1,
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_start_stop_path() {
        use WorkerState::*;
        assert!(Stopped.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn test_crash_and_restart_path() {
        use WorkerState::*;
        assert!(Running.can_transition_to(Crashed));
        assert!(Stopping.can_transition_to(Crashed));
        assert!(Crashed.can_transition_to(Starting));
        assert!(Crashed.can_transition_to(Stopped));
    }

    #[test]
    fn test_launch_failure_path() {
        use WorkerState::*;
        assert!(Starting.can_transition_to(Stopped));
        assert!(Starting.can_transition_to(Crashed));
    }

    #[test]
    fn test_rejected_transitions() {
        use WorkerState::*;
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Stopping));
        assert!(!Stopped.can_transition_to(Crashed));
        assert!(!Running.can_transition_to(Starting));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Stopping.can_transition_to(Starting));
        assert!(!Crashed.can_transition_to(Running));
        for state in [Stopped, Starting, Running, Stopping, Crashed] {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_launch_spec_display() {
        let spec = LaunchSpec::new("bun").with_args(["run", "scripts/bridge.ts"]);
        assert_eq!(spec.display_command(), "bun run scripts/bridge.ts");
        assert!(spec.is_valid());
        assert!(!LaunchSpec::new("  ").is_valid());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot {
            cycle_count: 42,
            workers: vec![WorkerRecord {
                name: "bridge".into(),
                state: WorkerState::Running,
                last_transition_at: Utc::now(),
                last_exit_code: Some(0),
                consecutive_crashes: 1,
            }],
            counters: SnapshotCounters::default(),
            summary: WorkerTally::default(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cycleCount"], 42);
        assert_eq!(json["workers"][0]["name"], "bridge");
        assert_eq!(json["workers"][0]["state"], "running");
        assert_eq!(json["workers"][0]["consecutiveCrashes"], 1);
        assert!(json["workers"][0].get("lastTransitionAt").is_some());
    }

    #[test]
    fn test_snapshot_counters_default_on_missing_field() {
        // Older snapshot files carry no counters block.
        let json = r#"{
            "cycleCount": 3,
            "workers": [],
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.cycle_count, 3);
        assert_eq!(snapshot.counters, SnapshotCounters::default());
    }

    #[test]
    fn test_modification_record_round_trip() {
        let record = ModificationRecord {
            timestamp: Utc::now(),
            worker_name: "monitor".into(),
            reason_summary: "reduced polling interval".into(),
            before: LaunchSpec::new("bun").with_args(["run", "monitor.ts"]),
            after: LaunchSpec::new("bun").with_args(["run", "monitor.ts", "--slow"]),
        };

        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"workerName\":\"monitor\""));
        assert!(line.contains("\"reasonSummary\""));
        let parsed: ModificationRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_recommendation_serde() {
        let none = Analysis::none("looks healthy");
        let json = serde_json::to_value(&none).unwrap();
        assert_eq!(json["recommendation"], "none");

        let modify = Analysis::modify(LaunchSpec::new("deno"), "swap runtime");
        let json = serde_json::to_value(&modify).unwrap();
        assert_eq!(json["recommendation"]["modify"]["program"], "deno");

        let parsed: Analysis = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, modify);
    }

    #[test]
    fn test_worker_tally() {
        let at = Utc::now();
        let record = |name: &str, state: WorkerState| WorkerRecord {
            name: name.into(),
            state,
            last_transition_at: at,
            last_exit_code: None,
            consecutive_crashes: 0,
        };
        let records = vec![
            record("a", WorkerState::Running),
            record("b", WorkerState::Stopped),
            record("c", WorkerState::Crashed),
            record("d", WorkerState::Starting),
        ];
        let tally = Snapshot::tally(&records);
        assert_eq!(tally.total, 4);
        assert_eq!(tally.running, 1);
        assert_eq!(tally.crashed, 1);
        assert_eq!(tally.stopped, 2);
    }
}
