use super::*;
use crate::audit::AuditLog;
use crate::metrics::SupervisorMetrics;
use crate::registry::WorkerRegistry;
use warden_types::{LaunchSpec, WorkerDefinition};

struct Fixture {
    registry: Arc<WorkerRegistry>,
    launcher: ProcessLauncher,
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    metrics: Arc<SupervisorMetrics>,
    _dir: tempfile::TempDir,
}

fn fixture(definitions: Vec<WorkerDefinition>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(WorkerRegistry::from_definitions(definitions).unwrap());
    let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
    let metrics = Arc::new(SupervisorMetrics::new());
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let launcher = ProcessLauncher::new(
        registry.clone(),
        audit,
        metrics.clone(),
        events_tx,
    );

    Fixture {
        registry,
        launcher,
        events: events_rx,
        metrics,
        _dir: dir,
    }
}

fn fake_handle(pid: u32) -> ProcessHandle {
    let (_tx, rx) = watch::channel(None);
    ProcessHandle::new(pid, rx, KillSwitch::new())
}

fn shell_worker(name: &str, script: &str) -> WorkerDefinition {
    WorkerDefinition::new(
        name,
        LaunchSpec::new("/bin/sh").with_args(["-c", script]),
    )
}

#[tokio::test]
async fn test_start_then_stop_walks_the_lifecycle() {
    let mut fx = fixture(vec![shell_worker("napper", "sleep 300")]);

    let pid = fx.launcher.start("napper").await.unwrap();
    assert!(pid > 0);

    let worker = fx.registry.get("napper").unwrap();
    assert_eq!(worker.status.state, WorkerState::Running);
    assert_eq!(worker.status.handle.map(|h| h.pid()), Some(pid));

    let outcome = fx
        .launcher
        .stop("napper", Duration::from_secs(5))
        .await
        .unwrap();
    // sh dies to SIGTERM without an exit code
    assert_eq!(outcome.code, None);

    let worker = fx.registry.get("napper").unwrap();
    assert_eq!(worker.status.state, WorkerState::Stopped);
    assert!(worker.status.handle.is_none());
    assert_eq!(worker.status.consecutive_crashes, 0);

    // the watcher still reports the exit through the event channel
    let event = tokio::time::timeout(Duration::from_secs(5), fx.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        SupervisorEvent::WorkerExited { name, .. } if name == "napper"
    ));
}

#[tokio::test]
async fn test_short_lived_worker_reports_its_exit_code() {
    let mut fx = fixture(vec![shell_worker("brief", "exit 7")]);

    fx.launcher.start("brief").await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), fx.events.recv())
        .await
        .unwrap()
        .unwrap();
    let SupervisorEvent::WorkerExited { name, outcome } = event else {
        panic!("expected an exit event");
    };
    assert_eq!(name, "brief");
    assert_eq!(outcome.code, Some(7));

    // classification happens upstream; the registry still says RUNNING
    assert_eq!(
        fx.registry.get("brief").unwrap().status.state,
        WorkerState::Running
    );
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill_when_term_is_ignored() {
    let mut fx = fixture(vec![shell_worker(
        "stubborn",
        r#"trap "" TERM; sleep 300"#,
    )]);

    fx.launcher.start("stubborn").await.unwrap();
    // give the shell a moment to install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    let outcome = fx
        .launcher
        .stop("stubborn", Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(outcome.code, None);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(
        fx.registry.get("stubborn").unwrap().status.state,
        WorkerState::Stopped
    );

    let summary = fx.metrics.summary();
    assert_eq!(summary.workers_stopped, 1);
    assert_eq!(summary.forced_kills, 1);

    let _ = fx.events.recv().await;
}

#[tokio::test]
async fn test_spawn_failure_leaves_worker_in_starting() {
    let fx = fixture(vec![WorkerDefinition::new(
        "ghost",
        LaunchSpec::new("/nonexistent/warden-no-such-binary"),
    )]);

    let err = fx.launcher.start("ghost").await.unwrap_err();
    assert!(matches!(err, WardenError::Launch(_)));

    // disposal of the failed start is the caller's decision
    assert_eq!(
        fx.registry.get("ghost").unwrap().status.state,
        WorkerState::Starting
    );
    assert!(fx.registry.get("ghost").unwrap().status.handle.is_none());
    assert_eq!(fx.metrics.summary().launch_failures, 1);
}

#[tokio::test]
async fn test_abandoned_stop_marks_the_worker_crashed() {
    // walks the registry by hand; a process that shrugs off SIGKILL
    // cannot be produced on demand
    let fx = fixture(vec![shell_worker("zombie", "sleep 300")]);
    fx.registry
        .transition("zombie", WorkerState::Starting)
        .unwrap();
    fx.registry
        .transition("zombie", WorkerState::Running)
        .unwrap();
    fx.registry.attach_handle("zombie", fake_handle(4242)).unwrap();
    fx.registry
        .transition("zombie", WorkerState::Stopping)
        .unwrap();

    fx.launcher.abandon_stop("zombie");

    let worker = fx.registry.get("zombie").unwrap();
    assert_eq!(worker.status.state, WorkerState::Crashed);
    assert!(worker.status.handle.is_none());
    assert_eq!(worker.status.last_exit_code, None);

    let audit = std::fs::read_to_string(fx._dir.path().join("audit.log")).unwrap();
    assert!(audit.contains("stop-abandoned worker=zombie"));

    // only a worker pinned in STOPPING is touched
    fx.launcher.abandon_stop("zombie");
    assert_eq!(
        fx.registry.get("zombie").unwrap().status.state,
        WorkerState::Crashed
    );
}

#[tokio::test]
async fn test_stop_without_live_process_fails() {
    let fx = fixture(vec![shell_worker("idle", "sleep 300")]);

    let err = fx
        .launcher
        .stop("idle", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Internal(_)));
    assert_eq!(
        fx.registry.get("idle").unwrap().status.state,
        WorkerState::Stopped
    );
}

#[tokio::test]
async fn test_start_unknown_worker_is_not_found() {
    let fx = fixture(vec![]);
    let err = fx.launcher.start("nobody").await.unwrap_err();
    assert!(matches!(err, WardenError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_wait_exited_times_out_without_an_exit() {
    let (tx, rx) = watch::channel(None);
    let handle = ProcessHandle::new(4242, rx, KillSwitch::new());

    assert_eq!(handle.wait_exited(Duration::from_secs(30)).await, None);

    tx.send(Some(ExitOutcome::signal())).unwrap();
    assert_eq!(
        handle.wait_exited(Duration::from_secs(30)).await,
        Some(ExitOutcome::signal())
    );
}

#[tokio::test]
async fn test_restart_uses_the_current_launch_spec() {
    let fx = fixture(vec![shell_worker("mutable", "sleep 300")]);

    fx.launcher.start("mutable").await.unwrap();
    fx.launcher
        .stop("mutable", Duration::from_secs(5))
        .await
        .unwrap();

    fx.registry
        .replace_launch_spec(
            "mutable",
            LaunchSpec::new("/bin/sh").with_args(["-c", "sleep 301"]),
        )
        .unwrap();

    fx.launcher.start("mutable").await.unwrap();
    let worker = fx.registry.get("mutable").unwrap();
    assert_eq!(worker.status.state, WorkerState::Running);
    assert_eq!(
        worker.definition.launch.args,
        vec!["-c".to_string(), "sleep 301".to_string()]
    );

    fx.launcher
        .stop("mutable", Duration::from_secs(5))
        .await
        .unwrap();
}
