//! The supervisor core.
//!
//! One logical control loop owns every decision: scheduler cycles,
//! reflection ticks and worker exit events all arrive through a single
//! `select!` so the registry is only ever mutated by one workflow at a
//! time. Reflection runs in its own task but announces itself through the
//! in-flight guard and feeds failures back as events, so the loop never
//! races it on the same worker.

mod crash;
mod cycle;
mod reflection;

pub use cycle::CycleDecision;
pub use reflection::{ReflectionOutcome, ReflectionPipeline};

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_types::{Snapshot, WardenError, WardenResult, WorkerState};

use crate::analysis::LaunchAnalyzer;
use crate::audit::{AuditEvent, AuditLog, ModificationLog};
use crate::config::SupervisorConfig;
use crate::launcher::{ProcessLauncher, SupervisorEvent};
use crate::metrics::SupervisorMetrics;
use crate::persistence::SnapshotStore;
use crate::registry::WorkerRegistry;

/// Lifecycle of the supervisor process itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorPhase {
    Init,
    Running,
    ShuttingDown,
    Stopped,
}

impl SupervisorPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<WorkerRegistry>,
    launcher: Arc<ProcessLauncher>,
    reflection: Arc<ReflectionPipeline>,
    audit: Arc<AuditLog>,
    metrics: Arc<SupervisorMetrics>,
    snapshots: SnapshotStore,
    cycle_count: AtomicU64,
    phase: AtomicU8,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SupervisorEvent>>>,
    shutdown_tx: watch::Sender<bool>,
    reflection_task: Mutex<Option<JoinHandle<ReflectionOutcome>>>,
}

impl Supervisor {
    /// Builds a supervisor from configuration. Fails if the worker roster
    /// is invalid or the log files cannot be opened.
    pub fn new(
        config: SupervisorConfig,
        analyzer: Arc<dyn LaunchAnalyzer>,
    ) -> WardenResult<Arc<Self>> {
        let registry = Arc::new(WorkerRegistry::from_definitions(
            config.workers.iter().map(|w| w.to_definition()),
        )?);

        let audit = Arc::new(AuditLog::open(config.audit_log_path())?);
        let modifications = ModificationLog::open(config.modifications_path())?;
        let metrics = Arc::new(SupervisorMetrics::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let launcher = Arc::new(ProcessLauncher::new(
            registry.clone(),
            audit.clone(),
            metrics.clone(),
            events_tx.clone(),
        ));

        let reflection = Arc::new(ReflectionPipeline::new(
            registry.clone(),
            launcher.clone(),
            analyzer,
            modifications,
            audit.clone(),
            metrics.clone(),
            events_tx.clone(),
            config.timing.grace_timeout(),
            config.analysis.timeout(),
        ));

        let snapshots = SnapshotStore::new(config.snapshot_path());
        let (shutdown_tx, _) = watch::channel(false);

        for worker in registry.list() {
            audit.record(AuditEvent::WorkerRegistered {
                worker: worker.definition.name,
                critical: worker.definition.critical,
            });
        }

        Ok(Arc::new(Self {
            config,
            registry,
            launcher,
            reflection,
            audit,
            metrics,
            snapshots,
            cycle_count: AtomicU64::new(0),
            phase: AtomicU8::new(SupervisorPhase::Init as u8),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown_tx,
            reflection_task: Mutex::new(None),
        }))
    }

    /// Loads the previous snapshot, if any. An unreadable snapshot is
    /// logged and ignored so a bad file never blocks startup.
    pub async fn restore(&self) {
        match self.snapshots.load().await {
            Ok(Some(snapshot)) => {
                let restored = self.registry.hydrate(&snapshot);
                self.cycle_count
                    .store(snapshot.cycle_count, Ordering::Relaxed);
                self.metrics.restore(&snapshot.counters);
                self.audit.record(AuditEvent::StateRestored {
                    workers: restored,
                    cycle_count: snapshot.cycle_count,
                });
                info!(
                    "Restored state for {} workers at cycle {}",
                    restored, snapshot.cycle_count
                );
            }
            Ok(None) => info!("No snapshot found, starting fresh"),
            Err(e) => warn!("Ignoring unreadable snapshot: {}", e),
        }
    }

    /// Runs the supervisor until shutdown is triggered, then performs the
    /// full shutdown sequence.
    pub async fn run(&self) -> WardenResult<()> {
        let mut events_rx = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| WardenError::Internal("Supervisor is already running".into()))?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.phase
            .store(SupervisorPhase::Running as u8, Ordering::SeqCst);
        self.audit.record(AuditEvent::SupervisorStarted {
            workers: self.registry.len(),
        });
        info!(
            "Supervising {} workers (cycle every {:?}, reflection every {:?})",
            self.registry.len(),
            self.config.timing.cycle_interval(),
            self.config.timing.reflection_interval()
        );

        let cycle_period = self.config.timing.cycle_interval();
        let mut cycle_timer =
            tokio::time::interval_at(tokio::time::Instant::now() + cycle_period, cycle_period);
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reflection_period = self.config.timing.reflection_interval();
        let mut reflection_timer = tokio::time::interval_at(
            tokio::time::Instant::now() + reflection_period,
            reflection_period,
        );
        reflection_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if *shutdown_rx.borrow() {
            info!("Shutdown was requested before the first cycle");
        } else {
            loop {
                tokio::select! {
                    _ = cycle_timer.tick() => {
                        self.run_cycle().await;
                    }
                    _ = reflection_timer.tick() => {
                        self.spawn_reflection();
                    }
                    Some(event) = events_rx.recv() => {
                        self.handle_event(event).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown_sequence().await;
        self.phase
            .store(SupervisorPhase::Stopped as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Requests shutdown. Safe to call from any task, any number of times.
    pub fn trigger_shutdown(&self) {
        let prev = self
            .phase
            .swap(SupervisorPhase::ShuttingDown as u8, Ordering::SeqCst);
        if prev != SupervisorPhase::ShuttingDown as u8 {
            info!("Shutdown requested");
            self.audit.record(AuditEvent::SupervisorStopping);
        }
        let _ = self.shutdown_tx.send(true);
    }

    pub fn phase(&self) -> SupervisorPhase {
        SupervisorPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<SupervisorMetrics> {
        &self.metrics
    }

    pub fn reflection(&self) -> &Arc<ReflectionPipeline> {
        &self.reflection
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launches one reflection pass in the background unless the previous
    /// one is still in flight.
    fn spawn_reflection(&self) {
        if self.phase() != SupervisorPhase::Running {
            return;
        }

        let mut guard = self.reflection_task.lock();
        if let Some(task) = guard.as_ref() {
            if !task.is_finished() {
                debug!("Reflection still in flight, skipping tick");
                self.metrics.record_reflection_skipped();
                return;
            }
        }

        let pipeline = self.reflection.clone();
        *guard = Some(tokio::spawn(async move { pipeline.run_once().await }));
    }

    /// Current state projected for persistence.
    pub fn snapshot(&self) -> Snapshot {
        let workers = self.registry.to_records();
        Snapshot {
            cycle_count: self.cycle_count(),
            summary: Snapshot::tally(&workers),
            workers,
            counters: self.metrics.counters(),
            timestamp: Utc::now(),
        }
    }

    /// Writes a snapshot, logging rather than failing on error; the next
    /// cycle retries.
    pub async fn write_snapshot(&self) {
        let snapshot = self.snapshot();
        match self.snapshots.save(&snapshot).await {
            Ok(()) => self.metrics.record_snapshot_write(true),
            Err(e) => {
                self.metrics.record_snapshot_write(false);
                warn!("Snapshot write failed: {}", e);
            }
        }
    }

    /// Orderly shutdown: wait out any reflection, stop every running
    /// worker, then persist the final state.
    async fn shutdown_sequence(&self) {
        info!("Supervisor shutting down");

        let pending = self.reflection_task.lock().take();
        if let Some(task) = pending {
            let limit = self.config.analysis.timeout()
                + 2 * self.config.timing.grace_timeout()
                + Duration::from_secs(5);
            match tokio::time::timeout(limit, task).await {
                Ok(Ok(outcome)) => debug!("In-flight reflection finished: {:?}", outcome),
                Ok(Err(e)) => warn!("Reflection task failed: {}", e),
                Err(_) => warn!("Reflection did not finish within {:?}", limit),
            }
        }

        let grace = self.config.timing.grace_timeout();
        for _ in 0..3 {
            let running: Vec<String> = self
                .registry
                .list()
                .into_iter()
                .filter(|w| w.status.state == WorkerState::Running)
                .map(|w| w.definition.name)
                .collect();
            if running.is_empty() {
                break;
            }

            debug!("Stopping {} running workers", running.len());
            let stops = running.iter().map(|name| self.launcher.stop(name, grace));
            for (name, result) in running.iter().zip(futures::future::join_all(stops).await) {
                if let Err(e) = result {
                    warn!("Shutdown stop of '{}' failed: {}", name, e);
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.write_snapshot().await;
        self.audit.record(AuditEvent::SupervisorStopped {
            cycle_count: self.cycle_count(),
        });
        self.metrics.flush();
        info!(
            "Supervisor stopped after {} cycles, uptime {}s",
            self.cycle_count(),
            self.metrics.uptime_secs()
        );
    }
}
