//! The scheduler cycle: observe, decide, act, persist.
//!
//! Deciding is a pure function over per-worker observations so the wake
//! and rest rules can be tested without clocks or processes. Acting runs
//! inline in the supervisor loop, which is what guarantees cycles never
//! overlap.

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_types::WorkerState;

use super::Supervisor;
use crate::audit::AuditEvent;

/// What one worker looked like when the cycle began.
#[derive(Clone, Debug)]
pub(crate) struct WorkerObservation {
    pub(crate) name: String,
    pub(crate) state: WorkerState,
    /// Time since the worker's last state transition.
    pub(crate) elapsed: Duration,
}

/// The starts and stops one cycle decided on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleDecision {
    pub starts: Vec<String>,
    pub stops: Vec<String>,
}

/// Applies the wake and rest rules to one cycle's observations.
///
/// A STOPPED worker idle past `wake_threshold` is started. A RUNNING
/// worker active past `rest_threshold` is stopped, unless stopping it
/// would leave nothing running. The reflection target is skipped outright
/// and never counts toward the running floor, since the pipeline is about
/// to stop it anyway.
pub(crate) fn plan(
    observations: &[WorkerObservation],
    wake_threshold: Duration,
    rest_threshold: Duration,
    reflection_target: Option<&str>,
) -> CycleDecision {
    let mut decision = CycleDecision::default();

    let mut remaining_running = observations
        .iter()
        .filter(|o| {
            o.state == WorkerState::Running && Some(o.name.as_str()) != reflection_target
        })
        .count();

    for obs in observations {
        if Some(obs.name.as_str()) == reflection_target {
            debug!("Worker '{}' is under reflection, skipping", obs.name);
            continue;
        }

        match obs.state {
            WorkerState::Stopped if obs.elapsed > wake_threshold => {
                decision.starts.push(obs.name.clone());
            }
            WorkerState::Running if obs.elapsed > rest_threshold => {
                if remaining_running > 1 {
                    decision.stops.push(obs.name.clone());
                    remaining_running -= 1;
                } else {
                    debug!(
                        "Worker '{}' is due for rest but is the last one running",
                        obs.name
                    );
                }
            }
            _ => {}
        }
    }

    decision
}

impl Supervisor {
    /// One full scheduler cycle.
    pub(crate) async fn run_cycle(&self) {
        let now = Utc::now();
        let observations: Vec<WorkerObservation> = self
            .registry
            .list()
            .into_iter()
            .map(|w| WorkerObservation {
                name: w.definition.name,
                state: w.status.state,
                elapsed: (now - w.status.last_transition_at)
                    .to_std()
                    .unwrap_or_default(),
            })
            .collect();

        let target = self.reflection.current_target();
        let decision = plan(
            &observations,
            self.config.timing.wake_threshold(),
            self.config.timing.rest_threshold(),
            target.as_deref(),
        );

        let mut stopped = 0;
        for name in &decision.stops {
            match self.launcher.stop(name, self.config.timing.grace_timeout()).await {
                Ok(_) => stopped += 1,
                Err(e) => warn!("Cycle stop of '{}' failed: {}", name, e),
            }
        }

        let mut started = 0;
        for name in &decision.starts {
            match self.launcher.start(name).await {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!("Cycle start of '{}' failed: {}", name, e);
                    // spawn failure leaves the worker in STARTING; park it
                    // so the next wake threshold retries
                    if let Err(e) = self.registry.transition(name, WorkerState::Stopped) {
                        warn!("Could not park '{}' after failed start: {}", name, e);
                    }
                }
            }
        }

        let cycle = self.cycle_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        self.metrics.record_cycle_completed();

        if started > 0 || stopped > 0 {
            self.audit.record(AuditEvent::CycleCompleted {
                cycle,
                started,
                stopped,
            });
            info!(
                "Cycle {}: started {}, stopped {}",
                cycle, started, stopped
            );
        } else {
            debug!("Cycle {}: nothing to do", cycle);
        }

        self.write_snapshot().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAKE: Duration = Duration::from_secs(60);
    const REST: Duration = Duration::from_secs(300);

    fn obs(name: &str, state: WorkerState, elapsed_secs: u64) -> WorkerObservation {
        WorkerObservation {
            name: name.to_string(),
            state,
            elapsed: Duration::from_secs(elapsed_secs),
        }
    }

    #[test]
    fn test_idle_workers_past_threshold_wake() {
        let decision = plan(
            &[
                obs("a", WorkerState::Stopped, 61),
                obs("b", WorkerState::Stopped, 60),
                obs("c", WorkerState::Stopped, 10),
            ],
            WAKE,
            REST,
            None,
        );

        assert_eq!(decision.starts, vec!["a"]);
        assert!(decision.stops.is_empty());
    }

    #[test]
    fn test_rested_workers_stop_but_one_survives() {
        let decision = plan(
            &[
                obs("a", WorkerState::Running, 301),
                obs("b", WorkerState::Running, 400),
            ],
            WAKE,
            REST,
            None,
        );

        assert_eq!(decision.stops, vec!["a"]);
        assert!(decision.starts.is_empty());
    }

    #[test]
    fn test_last_running_worker_is_never_stopped() {
        let decision = plan(&[obs("only", WorkerState::Running, 9999)], WAKE, REST, None);
        assert!(decision.stops.is_empty());
    }

    #[test]
    fn test_fresh_running_workers_keep_running() {
        let decision = plan(
            &[
                obs("a", WorkerState::Running, 10),
                obs("b", WorkerState::Running, 299),
            ],
            WAKE,
            REST,
            None,
        );
        assert_eq!(decision, CycleDecision::default());
    }

    #[test]
    fn test_transitional_and_crashed_workers_are_ignored() {
        let decision = plan(
            &[
                obs("a", WorkerState::Starting, 9999),
                obs("b", WorkerState::Stopping, 9999),
                obs("c", WorkerState::Crashed, 9999),
            ],
            WAKE,
            REST,
            None,
        );
        assert_eq!(decision, CycleDecision::default());
    }

    #[test]
    fn test_reflection_target_is_skipped_entirely() {
        let decision = plan(
            &[
                obs("target", WorkerState::Running, 9999),
                obs("idle", WorkerState::Stopped, 9999),
            ],
            WAKE,
            REST,
            Some("target"),
        );

        assert_eq!(decision.starts, vec!["idle"]);
        assert!(decision.stops.is_empty());
    }

    #[test]
    fn test_reflection_target_does_not_count_toward_floor() {
        // "other" looks like one of two running workers, but the target is
        // about to be stopped by the pipeline, so it must survive
        let decision = plan(
            &[
                obs("target", WorkerState::Running, 10),
                obs("other", WorkerState::Running, 9999),
            ],
            WAKE,
            REST,
            Some("target"),
        );
        assert!(decision.stops.is_empty());
    }

    #[test]
    fn test_mixed_cycle_wakes_and_rests_together() {
        let decision = plan(
            &[
                obs("tired-1", WorkerState::Running, 400),
                obs("tired-2", WorkerState::Running, 350),
                obs("fresh", WorkerState::Running, 5),
                obs("idle", WorkerState::Stopped, 120),
            ],
            WAKE,
            REST,
            None,
        );

        assert_eq!(decision.starts, vec!["idle"]);
        assert_eq!(decision.stops, vec!["tired-1", "tired-2"]);
    }
}
