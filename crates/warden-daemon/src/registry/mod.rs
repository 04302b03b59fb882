//! The worker registry: the single source of truth for worker state.
//!
//! Workers are held in registration order. Every state change goes through
//! [`WorkerRegistry::transition`], which enforces the lifecycle state
//! machine and stamps the transition time. Readers get cloned snapshots so
//! the lock is never held across an await point.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use warden_types::{
    LaunchSpec, Snapshot, WardenError, WardenResult, WorkerDefinition, WorkerRecord, WorkerState,
};

use crate::launcher::ProcessHandle;

/// Live status of one registered worker.
#[derive(Clone, Debug)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub handle: Option<ProcessHandle>,
    pub last_transition_at: DateTime<Utc>,
    pub last_exit_code: Option<i32>,
    pub consecutive_crashes: u32,
}

impl WorkerStatus {
    fn new() -> Self {
        Self {
            state: WorkerState::Stopped,
            handle: None,
            last_transition_at: Utc::now(),
            last_exit_code: None,
            consecutive_crashes: 0,
        }
    }
}

/// A registered worker: its definition plus current status.
#[derive(Clone, Debug)]
pub struct RegisteredWorker {
    pub definition: WorkerDefinition,
    pub status: WorkerStatus,
}

/// Thread-safe table of all supervised workers.
pub struct WorkerRegistry {
    workers: RwLock<Vec<RegisteredWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(Vec::new()),
        }
    }

    /// Builds a registry from a worker roster, rejecting duplicate names.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = WorkerDefinition>,
    ) -> WardenResult<Self> {
        let registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    pub fn register(&self, definition: WorkerDefinition) -> WardenResult<()> {
        let mut workers = self.workers.write();

        if workers.iter().any(|w| w.definition.name == definition.name) {
            return Err(WardenError::DuplicateName(definition.name));
        }

        debug!("Registered worker '{}'", definition.name);
        workers.push(RegisteredWorker {
            definition,
            status: WorkerStatus::new(),
        });

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers
            .read()
            .iter()
            .map(|w| w.definition.name.clone())
            .collect()
    }

    /// Cloned snapshot of one worker.
    pub fn get(&self, name: &str) -> WardenResult<RegisteredWorker> {
        self.workers
            .read()
            .iter()
            .find(|w| w.definition.name == name)
            .cloned()
            .ok_or_else(|| WardenError::NotFound(name.to_string()))
    }

    /// Cloned snapshot of all workers in registration order.
    pub fn list(&self) -> Vec<RegisteredWorker> {
        self.workers.read().clone()
    }

    pub fn state_of(&self, name: &str) -> WardenResult<WorkerState> {
        Ok(self.get(name)?.status.state)
    }

    pub fn running_count(&self) -> usize {
        self.workers
            .read()
            .iter()
            .filter(|w| w.status.state == WorkerState::Running)
            .count()
    }

    /// Moves a worker to `next`, enforcing the lifecycle state machine.
    ///
    /// Returns the state the worker was in before the transition.
    pub fn transition(&self, name: &str, next: WorkerState) -> WardenResult<WorkerState> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;

        let prior = worker.status.state;
        if !prior.can_transition_to(next) {
            return Err(WardenError::InvalidTransition {
                worker: name.to_string(),
                from: prior,
                to: next,
            });
        }

        worker.status.state = next;
        worker.status.last_transition_at = Utc::now();
        debug!("Worker '{}': {} -> {}", name, prior, next);

        Ok(prior)
    }

    pub fn attach_handle(&self, name: &str, handle: ProcessHandle) -> WardenResult<()> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;
        worker.status.handle = Some(handle);
        Ok(())
    }

    pub fn clear_handle(&self, name: &str) -> WardenResult<()> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;
        worker.status.handle = None;
        Ok(())
    }

    pub fn record_exit(&self, name: &str, code: Option<i32>) -> WardenResult<()> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;
        worker.status.last_exit_code = code;
        Ok(())
    }

    /// Increments the consecutive crash counter, returning the new count.
    pub fn bump_crashes(&self, name: &str) -> WardenResult<u32> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;
        worker.status.consecutive_crashes += 1;
        Ok(worker.status.consecutive_crashes)
    }

    pub fn reset_crashes(&self, name: &str) -> WardenResult<()> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;
        worker.status.consecutive_crashes = 0;
        Ok(())
    }

    /// Swaps in a rewritten launch spec, returning the one it replaces.
    pub fn replace_launch_spec(
        &self,
        name: &str,
        spec: LaunchSpec,
    ) -> WardenResult<LaunchSpec> {
        let mut workers = self.workers.write();
        let worker = find_mut(&mut workers, name)?;
        let old = std::mem::replace(&mut worker.definition.launch, spec);
        Ok(old)
    }

    /// Restores persisted per-worker fields from a snapshot.
    ///
    /// Every matched worker lands in STOPPED regardless of the state it was
    /// persisted in; a process from a previous supervisor is gone either
    /// way. Snapshot entries with no registered counterpart are skipped.
    pub fn hydrate(&self, snapshot: &Snapshot) -> usize {
        let mut workers = self.workers.write();
        let mut restored = 0;

        for record in &snapshot.workers {
            let Some(worker) = workers
                .iter_mut()
                .find(|w| w.definition.name == record.name)
            else {
                debug!("Snapshot worker '{}' is no longer configured", record.name);
                continue;
            };

            worker.status.state = WorkerState::Stopped;
            worker.status.handle = None;
            worker.status.last_transition_at = Utc::now();
            worker.status.last_exit_code = record.last_exit_code;
            worker.status.consecutive_crashes = record.consecutive_crashes;
            restored += 1;
        }

        restored
    }

    /// Per-worker records for the next snapshot.
    pub fn to_records(&self) -> Vec<WorkerRecord> {
        self.workers
            .read()
            .iter()
            .map(|w| WorkerRecord {
                name: w.definition.name.clone(),
                state: w.status.state,
                last_transition_at: w.status.last_transition_at,
                last_exit_code: w.status.last_exit_code,
                consecutive_crashes: w.status.consecutive_crashes,
            })
            .collect()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_mut<'a>(
    workers: &'a mut [RegisteredWorker],
    name: &str,
) -> WardenResult<&'a mut RegisteredWorker> {
    workers
        .iter_mut()
        .find(|w| w.definition.name == name)
        .ok_or_else(|| WardenError::NotFound(name.to_string()))
}
