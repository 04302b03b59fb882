use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;
use warden_types::SnapshotCounters;

/// Running counters for supervisor activity.
///
/// All counters are monotonic within a run. The lifetime totals carried in
/// [`SnapshotCounters`] are restored from the last snapshot at startup so
/// they accumulate across restarts.
pub struct SupervisorMetrics {
    cycles_completed: AtomicU64,
    workers_started: AtomicU64,
    workers_stopped: AtomicU64,
    forced_kills: AtomicU64,
    crashes_observed: AtomicU64,
    restarts_scheduled: AtomicU64,
    launch_failures: AtomicU64,
    reflections_completed: AtomicU64,
    reflections_skipped: AtomicU64,
    modifications_applied: AtomicU64,
    snapshot_writes: AtomicU64,
    snapshot_failures: AtomicU64,
    start_time: Instant,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSummary {
    pub cycles_completed: u64,
    pub workers_started: u64,
    pub workers_stopped: u64,
    pub forced_kills: u64,
    pub crashes_observed: u64,
    pub restarts_scheduled: u64,
    pub launch_failures: u64,
    pub reflections_completed: u64,
    pub reflections_skipped: u64,
    pub modifications_applied: u64,
    pub snapshot_writes: u64,
    pub snapshot_failures: u64,
    pub uptime_secs: u64,
}

impl SupervisorMetrics {
    pub fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            workers_started: AtomicU64::new(0),
            workers_stopped: AtomicU64::new(0),
            forced_kills: AtomicU64::new(0),
            crashes_observed: AtomicU64::new(0),
            restarts_scheduled: AtomicU64::new(0),
            launch_failures: AtomicU64::new(0),
            reflections_completed: AtomicU64::new(0),
            reflections_skipped: AtomicU64::new(0),
            modifications_applied: AtomicU64::new(0),
            snapshot_writes: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Seeds lifetime counters from the last persisted snapshot.
    pub fn restore(&self, counters: &SnapshotCounters) {
        self.workers_started
            .store(counters.workers_started, Ordering::Relaxed);
        self.workers_stopped
            .store(counters.workers_stopped, Ordering::Relaxed);
        self.crashes_observed
            .store(counters.crashes_observed, Ordering::Relaxed);
        self.restarts_scheduled
            .store(counters.restarts_scheduled, Ordering::Relaxed);
        self.reflections_completed
            .store(counters.reflections_completed, Ordering::Relaxed);
        self.modifications_applied
            .store(counters.modifications_applied, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_stopped(&self, forced: bool) {
        self.workers_stopped.fetch_add(1, Ordering::Relaxed);
        if forced {
            self.forced_kills.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_crash(&self) {
        self.crashes_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart_scheduled(&self) {
        self.restarts_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reflection_completed(&self, modified: bool) {
        self.reflections_completed.fetch_add(1, Ordering::Relaxed);
        if modified {
            self.modifications_applied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reflection_skipped(&self) {
        self.reflections_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_write(&self, success: bool) {
        if success {
            self.snapshot_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn crashes_observed(&self) -> u64 {
        self.crashes_observed.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Counters persisted into each snapshot.
    pub fn counters(&self) -> SnapshotCounters {
        SnapshotCounters {
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_stopped: self.workers_stopped.load(Ordering::Relaxed),
            crashes_observed: self.crashes_observed.load(Ordering::Relaxed),
            restarts_scheduled: self.restarts_scheduled.load(Ordering::Relaxed),
            reflections_completed: self.reflections_completed.load(Ordering::Relaxed),
            modifications_applied: self.modifications_applied.load(Ordering::Relaxed),
        }
    }

    pub fn flush(&self) {
        debug!(
            "Flushing metrics: cycles={}, crashes={}, uptime={}s",
            self.cycles_completed(),
            self.crashes_observed(),
            self.uptime_secs()
        );
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_stopped: self.workers_stopped.load(Ordering::Relaxed),
            forced_kills: self.forced_kills.load(Ordering::Relaxed),
            crashes_observed: self.crashes_observed.load(Ordering::Relaxed),
            restarts_scheduled: self.restarts_scheduled.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            reflections_completed: self.reflections_completed.load(Ordering::Relaxed),
            reflections_skipped: self.reflections_skipped.load(Ordering::Relaxed),
            modifications_applied: self.modifications_applied.load(Ordering::Relaxed),
            snapshot_writes: self.snapshot_writes.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for SupervisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = SupervisorMetrics::new();
        let counters = metrics.counters();
        assert_eq!(counters.workers_started, 0);
        assert_eq!(counters.crashes_observed, 0);
        assert_eq!(metrics.cycles_completed(), 0);
    }

    #[test]
    fn test_record_and_read_back() {
        let metrics = SupervisorMetrics::new();
        metrics.record_worker_started();
        metrics.record_worker_started();
        metrics.record_worker_stopped(true);
        metrics.record_crash();
        metrics.record_reflection_completed(true);
        metrics.record_reflection_completed(false);

        let summary = metrics.summary();
        assert_eq!(summary.workers_started, 2);
        assert_eq!(summary.workers_stopped, 1);
        assert_eq!(summary.forced_kills, 1);
        assert_eq!(summary.crashes_observed, 1);
        assert_eq!(summary.reflections_completed, 2);
        assert_eq!(summary.modifications_applied, 1);
    }

    #[test]
    fn test_restore_seeds_lifetime_counters() {
        let metrics = SupervisorMetrics::new();
        metrics.restore(&SnapshotCounters {
            workers_started: 10,
            workers_stopped: 9,
            crashes_observed: 3,
            restarts_scheduled: 2,
            reflections_completed: 5,
            modifications_applied: 1,
        });

        metrics.record_worker_started();
        let counters = metrics.counters();
        assert_eq!(counters.workers_started, 11);
        assert_eq!(counters.crashes_observed, 3);
    }
}
