#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audit;
pub mod config;
pub mod launcher;
pub mod metrics;
pub mod persistence;
pub mod registry;
pub mod supervisor;

pub use analysis::{analyzer_from_config, CommandAnalyzer, LaunchAnalyzer, NoOpAnalyzer};
pub use audit::{AuditEvent, AuditLog, ModificationLog};
pub use config::{AnalysisConfig, SupervisorConfig, TimingConfig, WorkerEntry};
pub use launcher::{ExitOutcome, KillSwitch, ProcessHandle, ProcessLauncher, SupervisorEvent};
pub use metrics::{MetricsSummary, SupervisorMetrics};
pub use persistence::SnapshotStore;
pub use registry::{RegisteredWorker, WorkerRegistry, WorkerStatus};
pub use supervisor::{
    CycleDecision, ReflectionOutcome, ReflectionPipeline, Supervisor, SupervisorPhase,
};
