//! Crash handling: exit event classification, backoff restarts for
//! critical workers, parking for everyone else.

use tracing::{debug, info, warn};
use warden_types::WorkerState;

use super::{Supervisor, SupervisorPhase};
use crate::audit::AuditEvent;
use crate::launcher::{ExitOutcome, SupervisorEvent};

impl Supervisor {
    /// Routes one event from the launcher or a backoff timer.
    pub(crate) async fn handle_event(&self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::WorkerExited { name, outcome } => {
                self.handle_worker_exit(&name, outcome).await;
            }
            SupervisorEvent::RestartDue { name } => {
                self.handle_restart_due(&name).await;
            }
        }
    }

    /// Classifies a worker exit by the state the registry holds for it: an
    /// exit during STOPPING or STOPPED was requested through the launcher,
    /// anything else is a crash.
    async fn handle_worker_exit(&self, name: &str, outcome: ExitOutcome) {
        let worker = match self.registry.get(name) {
            Ok(worker) => worker,
            Err(e) => {
                warn!("Exit event for unknown worker '{}': {}", name, e);
                return;
            }
        };

        match worker.status.state {
            WorkerState::Stopping | WorkerState::Stopped => {
                debug!("Worker '{}' exit was requested ({})", name, outcome);
            }
            state => {
                self.handle_crash(name, worker.definition.critical, state, outcome)
                    .await;
            }
        }
    }

    /// One crash: mark it, count it, then either schedule a backoff
    /// restart (critical) or park the worker until the next wake cycle.
    async fn handle_crash(
        &self,
        name: &str,
        critical: bool,
        state: WorkerState,
        outcome: ExitOutcome,
    ) {
        warn!("Worker '{}' crashed ({})", name, outcome);
        self.metrics.record_crash();

        // the reflection pipeline may already have marked it crashed
        if state != WorkerState::Crashed {
            if let Err(e) = self.registry.transition(name, WorkerState::Crashed) {
                warn!("Could not mark '{}' crashed: {}", name, e);
                return;
            }
        }

        let crashes = self.registry.bump_crashes(name).unwrap_or(1);
        if let Err(e) = self.registry.record_exit(name, outcome.code) {
            warn!("Could not record exit for '{}': {}", name, e);
        }
        if let Err(e) = self.registry.clear_handle(name) {
            warn!("Could not clear handle for '{}': {}", name, e);
        }

        self.audit.record(AuditEvent::WorkerCrashed {
            worker: name.to_string(),
            exit_code: outcome.code,
            consecutive: crashes,
        });

        if critical {
            let backoff = self.config.timing.crash_backoff();
            self.audit.record(AuditEvent::RestartScheduled {
                worker: name.to_string(),
                backoff_secs: backoff.as_secs(),
            });
            self.metrics.record_restart_scheduled();
            info!(
                "Critical worker '{}' restarting in {:?} (crash #{})",
                name, backoff, crashes
            );

            let events = self.events_tx.clone();
            let worker = name.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                let _ = events.send(SupervisorEvent::RestartDue { name: worker });
            });
        } else {
            match self.registry.transition(name, WorkerState::Stopped) {
                Ok(_) => {
                    self.audit.record(AuditEvent::WorkerParked {
                        worker: name.to_string(),
                    });
                    info!("Worker '{}' parked until the next wake cycle", name);
                }
                Err(e) => warn!("Could not park crashed worker '{}': {}", name, e),
            }
        }
    }

    /// A crash backoff elapsed; restart the worker if nothing else has
    /// touched it in the meantime.
    async fn handle_restart_due(&self, name: &str) {
        match self.registry.state_of(name) {
            Ok(WorkerState::Crashed) => {}
            Ok(state) => {
                debug!("Restart of '{}' superseded, worker is {}", name, state);
                return;
            }
            Err(e) => {
                warn!("Restart event for unknown worker '{}': {}", name, e);
                return;
            }
        }

        if self.phase() != SupervisorPhase::Running {
            debug!("Skipping restart of '{}' during shutdown", name);
            return;
        }

        info!("Restarting crashed worker '{}'", name);
        if let Err(e) = self.launcher.start(name).await {
            warn!("Restart of '{}' failed: {}", name, e);
            // no process was spawned, so synthesize the exit event that
            // re-enters crash handling and re-arms the backoff
            let _ = self.events_tx.send(SupervisorEvent::WorkerExited {
                name: name.to_string(),
                outcome: ExitOutcome::signal(),
            });
        }
    }
}
