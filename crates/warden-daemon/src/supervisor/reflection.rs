//! The reflection pipeline: stop one worker, analyze it, maybe rewrite
//! its launch spec, start it again.
//!
//! Exactly one reflection may be in flight at a time, enforced by an
//! atomic guard. The worker under reflection is published so the cycle
//! planner keeps its hands off it.

use chrono::Utc;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_types::{Analysis, ModificationRecord, Recommendation, WorkerState};

use crate::analysis::LaunchAnalyzer;
use crate::audit::{AuditEvent, AuditLog, ModificationLog};
use crate::launcher::{ExitOutcome, ProcessLauncher, SupervisorEvent};
use crate::metrics::SupervisorMetrics;
use crate::registry::WorkerRegistry;

/// How one reflection pass ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReflectionOutcome {
    /// Another pass was already in flight; this one did nothing.
    AlreadyInFlight,
    /// No worker qualified for reflection.
    NoCandidate,
    Completed { worker: String, modified: bool },
    Aborted { worker: String, reason: String },
}

pub struct ReflectionPipeline {
    registry: Arc<WorkerRegistry>,
    launcher: Arc<ProcessLauncher>,
    analyzer: Arc<dyn LaunchAnalyzer>,
    modifications: ModificationLog,
    audit: Arc<AuditLog>,
    metrics: Arc<SupervisorMetrics>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    in_flight: AtomicBool,
    target: Mutex<Option<String>>,
    grace: Duration,
    analysis_timeout: Duration,
}

impl ReflectionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<WorkerRegistry>,
        launcher: Arc<ProcessLauncher>,
        analyzer: Arc<dyn LaunchAnalyzer>,
        modifications: ModificationLog,
        audit: Arc<AuditLog>,
        metrics: Arc<SupervisorMetrics>,
        events: mpsc::UnboundedSender<SupervisorEvent>,
        grace: Duration,
        analysis_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            launcher,
            analyzer,
            modifications,
            audit,
            metrics,
            events,
            in_flight: AtomicBool::new(false),
            target: Mutex::new(None),
            grace,
            analysis_timeout,
        }
    }

    /// The worker currently under reflection, if any.
    pub fn current_target(&self) -> Option<String> {
        self.target.lock().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs one reflection pass. Concurrent calls collapse to a single
    /// execution; the losers return immediately.
    pub async fn run_once(&self) -> ReflectionOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reflection already in flight, skipping");
            self.metrics.record_reflection_skipped();
            return ReflectionOutcome::AlreadyInFlight;
        }

        let outcome = self.reflect().await;

        // target is cleared before the guard so nobody ever observes a
        // stale target on a fresh pass
        *self.target.lock() = None;
        self.in_flight.store(false, Ordering::SeqCst);

        outcome
    }

    async fn reflect(&self) -> ReflectionOutcome {
        let running: Vec<String> = self
            .registry
            .list()
            .into_iter()
            .filter(|w| w.status.state == WorkerState::Running)
            .map(|w| w.definition.name)
            .collect();

        // never reflect the last active worker
        if running.len() < 2 {
            debug!(
                "Reflection skipped: {} worker(s) running, need at least 2",
                running.len()
            );
            self.metrics.record_reflection_skipped();
            return ReflectionOutcome::NoCandidate;
        }

        let Some(name) = running.choose(&mut rand::thread_rng()).cloned() else {
            return ReflectionOutcome::NoCandidate;
        };

        *self.target.lock() = Some(name.clone());
        self.audit.record(AuditEvent::ReflectionSelected {
            worker: name.clone(),
        });
        info!("Reflecting on worker '{}'", name);

        // a stop that fails past SIGKILL leaves the worker CRASHED with an
        // exit event pending; the crash handler takes over from there
        if let Err(e) = self.launcher.stop(&name, self.grace).await {
            warn!("Reflection stop of '{}' failed: {}", name, e);
            return self.abort(name, e.to_string());
        }

        let definition = match self.registry.get(&name) {
            Ok(worker) => worker.definition,
            Err(e) => return self.abort(name, e.to_string()),
        };

        let analysis = match tokio::time::timeout(
            self.analysis_timeout,
            self.analyzer.analyze(&definition),
        )
        .await
        {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                warn!("Analysis of '{}' failed: {}", name, e);
                Analysis::none("analysis failed")
            }
            Err(_) => {
                warn!(
                    "Analysis of '{}' timed out after {:?}",
                    name, self.analysis_timeout
                );
                Analysis::none("analysis timed out")
            }
        };

        self.audit.record(AuditEvent::ReflectionAnalyzed {
            worker: name.clone(),
            recommendation: match &analysis.recommendation {
                Recommendation::None => "none".to_string(),
                Recommendation::Modify(_) => "modify".to_string(),
            },
        });

        let modified = match analysis.recommendation {
            Recommendation::Modify(new_spec) if new_spec.is_valid() => {
                match self.registry.replace_launch_spec(&name, new_spec.clone()) {
                    Ok(before) => {
                        let record = ModificationRecord {
                            timestamp: Utc::now(),
                            worker_name: name.clone(),
                            reason_summary: analysis.rationale.clone(),
                            before,
                            after: new_spec,
                        };
                        if let Err(e) = self.modifications.append(&record) {
                            warn!("Failed to log modification for '{}': {}", name, e);
                        }
                        self.audit.record(AuditEvent::SpecModified {
                            worker: name.clone(),
                        });
                        info!(
                            "Worker '{}' launch spec rewritten: {}",
                            name, analysis.rationale
                        );
                        true
                    }
                    Err(e) => {
                        warn!("Could not apply modification to '{}': {}", name, e);
                        false
                    }
                }
            }
            Recommendation::Modify(_) => {
                warn!("Ignoring invalid replacement spec for '{}'", name);
                false
            }
            Recommendation::None => {
                debug!("No modification recommended for '{}'", name);
                false
            }
        };

        if let Err(e) = self.launcher.start(&name).await {
            warn!("Reflection restart of '{}' failed: {}", name, e);
            // the failed start leaves the worker in STARTING with no
            // process behind it, so no exit event will ever arrive; send
            // one so the crash handler takes over
            let _ = self.events.send(SupervisorEvent::WorkerExited {
                name: name.clone(),
                outcome: ExitOutcome::signal(),
            });
            return self.abort(name, e.to_string());
        }

        self.audit.record(AuditEvent::ReflectionCompleted {
            worker: name.clone(),
            modified,
        });
        self.metrics.record_reflection_completed(modified);
        info!("Reflection of '{}' complete (modified: {})", name, modified);

        ReflectionOutcome::Completed {
            worker: name,
            modified,
        }
    }

    fn abort(&self, worker: String, reason: String) -> ReflectionOutcome {
        self.audit.record(AuditEvent::ReflectionAborted {
            worker: worker.clone(),
            reason: reason.clone(),
        });
        ReflectionOutcome::Aborted { worker, reason }
    }
}
