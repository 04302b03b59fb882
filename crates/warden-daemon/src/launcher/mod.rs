//! Spawning and stopping of worker processes.
//!
//! Each started worker gets three companion tasks: two line readers that
//! forward captured stdout/stderr into the supervisor log, and a watcher
//! that owns the [`tokio::process::Child`], waits for it to exit and
//! publishes the outcome. The watcher is the only place the child is ever
//! awaited, so stopping a worker is coordinated through its kill switch
//! and exit channel rather than by touching the child directly.

mod kill_switch;

pub use kill_switch::KillSwitch;

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use warden_types::{WardenError, WardenResult, WorkerState};

use crate::audit::{AuditEvent, AuditLog};
use crate::metrics::SupervisorMetrics;
use crate::registry::WorkerRegistry;

/// How long to wait for a process to die after SIGKILL before giving up.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// How a worker process left this world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }

    pub fn signal() -> Self {
        Self { code: None }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Shared view onto a live worker process.
///
/// The child itself is owned by the watcher task. The handle carries the
/// pid for signalling, the kill switch for forced termination and a watch
/// channel the watcher publishes the exit outcome on.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    exited: watch::Receiver<Option<ExitOutcome>>,
    kill: KillSwitch,
}

impl ProcessHandle {
    pub(crate) fn new(
        pid: u32,
        exited: watch::Receiver<Option<ExitOutcome>>,
        kill: KillSwitch,
    ) -> Self {
        Self { pid, exited, kill }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit outcome if the process has already terminated.
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        *self.exited.borrow()
    }

    /// Asks the watcher to SIGKILL the process. Idempotent.
    pub fn force_kill(&self) {
        self.kill.trigger();
    }

    /// Waits up to `limit` for the process to exit, returning the outcome
    /// or `None` on timeout.
    pub async fn wait_exited(&self, limit: Duration) -> Option<ExitOutcome> {
        let mut rx = self.exited.clone();
        let deadline = tokio::time::Instant::now() + limit;

        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return Some(outcome);
            }

            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return *rx.borrow(),
                Err(_) => return None,
            }
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exited", &self.exit_outcome())
            .finish()
    }
}

/// Events fed into the supervisor's main loop by background tasks.
#[derive(Clone, Debug)]
pub enum SupervisorEvent {
    /// A worker process terminated for any reason.
    WorkerExited {
        name: String,
        outcome: ExitOutcome,
    },
    /// A crash backoff elapsed and the worker should be restarted.
    RestartDue { name: String },
}

/// Starts and stops worker processes, keeping the registry in step.
pub struct ProcessLauncher {
    registry: Arc<WorkerRegistry>,
    audit: Arc<AuditLog>,
    metrics: Arc<SupervisorMetrics>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl ProcessLauncher {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        audit: Arc<AuditLog>,
        metrics: Arc<SupervisorMetrics>,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            registry,
            audit,
            metrics,
            events,
        }
    }

    /// Spawns the worker's process from its current launch spec.
    ///
    /// On success the worker is RUNNING with a live handle attached. On
    /// spawn failure the worker is left in STARTING and the caller decides
    /// how to dispose of it.
    pub async fn start(&self, name: &str) -> WardenResult<u32> {
        let definition = self.registry.get(name)?.definition;
        self.registry.transition(name, WorkerState::Starting)?;

        let spec = &definition.launch;
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch worker '{}': {}", name, e);
                self.audit.record(AuditEvent::LaunchFailed {
                    worker: name.to_string(),
                    reason: e.to_string(),
                });
                self.metrics.record_launch_failure();
                return Err(WardenError::Launch(format!(
                    "Failed to spawn '{}': {}",
                    spec.display_command(),
                    e
                )));
            }
        };

        let pid = child.id().unwrap_or_default();

        if let Some(stdout) = child.stdout.take() {
            let worker = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", worker, line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let worker = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{} stderr] {}", worker, line);
                }
            });
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = KillSwitch::new();
        let handle = ProcessHandle::new(pid, exit_rx, kill.clone());

        self.registry.attach_handle(name, handle)?;
        self.registry.transition(name, WorkerState::Running)?;

        self.audit.record(AuditEvent::WorkerStarted {
            worker: name.to_string(),
            pid,
        });
        self.metrics.record_worker_started();
        info!("Worker '{}' started with pid {}", name, pid);

        let events = self.events.clone();
        let worker = name.to_string();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => ExitOutcome::from_status(status),
                    Err(e) => {
                        warn!("Waiting on worker '{}' failed: {}", worker, e);
                        ExitOutcome::signal()
                    }
                },
                _ = kill.triggered() => {
                    if let Err(e) = child.start_kill() {
                        warn!("SIGKILL for worker '{}' failed: {}", worker, e);
                    }
                    match child.wait().await {
                        Ok(status) => ExitOutcome::from_status(status),
                        Err(e) => {
                            warn!("Waiting on worker '{}' failed: {}", worker, e);
                            ExitOutcome::signal()
                        }
                    }
                }
            };

            debug!("Worker '{}' exited: {}", worker, outcome);
            let _ = exit_tx.send(Some(outcome));
            let _ = events.send(SupervisorEvent::WorkerExited {
                name: worker,
                outcome,
            });
        });

        Ok(pid)
    }

    /// Stops a RUNNING worker: SIGTERM, wait up to `grace`, then SIGKILL.
    ///
    /// Completes the full STOPPING to STOPPED transition, records the exit
    /// code and resets the crash counter.
    pub async fn stop(&self, name: &str, grace: Duration) -> WardenResult<ExitOutcome> {
        let handle = self
            .registry
            .get(name)?
            .status
            .handle
            .ok_or_else(|| {
                WardenError::Internal(format!("Worker '{}' has no live process", name))
            })?;

        self.registry.transition(name, WorkerState::Stopping)?;
        info!("Stopping worker '{}' (pid {})", name, handle.pid());

        terminate(handle.pid(), &handle);

        let (outcome, forced) = match handle.wait_exited(grace).await {
            Some(outcome) => (outcome, false),
            None => {
                warn!(
                    "Worker '{}' ignored SIGTERM for {:?}, killing",
                    name, grace
                );
                handle.force_kill();
                match handle.wait_exited(KILL_WAIT).await {
                    Some(outcome) => (outcome, true),
                    None => {
                        self.abandon_stop(name);
                        return Err(WardenError::Internal(format!(
                            "Worker '{}' did not exit after SIGKILL",
                            name
                        )));
                    }
                }
            }
        };

        self.registry.record_exit(name, outcome.code)?;
        self.registry.transition(name, WorkerState::Stopped)?;
        self.registry.reset_crashes(name)?;
        self.registry.clear_handle(name)?;

        self.audit.record(AuditEvent::WorkerStopped {
            worker: name.to_string(),
            exit_code: outcome.code,
            forced,
        });
        self.metrics.record_worker_stopped(forced);
        info!("Worker '{}' stopped ({})", name, outcome);

        Ok(outcome)
    }

    /// Gives up on a stop that got no exit even after SIGKILL.
    ///
    /// The worker cannot stay pinned in STOPPING with nobody coming back
    /// for it, or every future cycle would skip it forever. Moving it to
    /// CRASHED lets the exit event, whenever the kernel finally reaps the
    /// process, be handled as a crash.
    fn abandon_stop(&self, name: &str) {
        if !matches!(
            self.registry.get(name).map(|w| w.status.state),
            Ok(WorkerState::Stopping)
        ) {
            return;
        }

        if let Err(e) = self.registry.transition(name, WorkerState::Crashed) {
            warn!("Could not mark abandoned worker '{}' crashed: {}", name, e);
            return;
        }
        if let Err(e) = self.registry.record_exit(name, None) {
            warn!("Could not record exit for '{}': {}", name, e);
        }
        if let Err(e) = self.registry.clear_handle(name) {
            warn!("Could not clear handle for '{}': {}", name, e);
        }
        self.audit.record(AuditEvent::StopAbandoned {
            worker: name.to_string(),
        });
    }
}

/// Delivers SIGTERM where the platform supports it, otherwise goes
/// straight to the kill switch.
#[cfg(unix)]
fn terminate(pid: u32, handle: &ProcessHandle) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("SIGTERM to pid {} failed: {}", pid, e);
        handle.force_kill();
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32, handle: &ProcessHandle) {
    handle.force_kill();
}

#[cfg(all(test, unix))]
mod tests;
