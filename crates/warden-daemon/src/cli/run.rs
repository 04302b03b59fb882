use super::utils::{print_banner, process_alive};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use warden_daemon::{analyzer_from_config, Supervisor, SupervisorConfig};
use warden_types::{WardenError, WardenResult};

pub async fn run_supervisor(
    config_path: &PathBuf,
    data_dir: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    systemd: bool,
) -> WardenResult<()> {
    print_banner();
    info!("Starting Warden supervisor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SupervisorConfig::load(config_path)?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    info!("Data directory: {:?}", config.data_dir);

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| WardenError::Config(format!("Failed to create data directory: {}", e)))?;
    std::fs::create_dir_all(config.logs_dir())
        .map_err(|e| WardenError::Config(format!("Failed to create logs directory: {}", e)))?;

    let pid_path = pid_file.unwrap_or_else(|| config.pid_file_path());
    check_stale_pid(&pid_path)?;
    std::fs::write(&pid_path, std::process::id().to_string())
        .map_err(|e| WardenError::Config(format!("Failed to write PID file: {}", e)))?;
    info!("PID file written: {:?}", pid_path);

    let analyzer = analyzer_from_config(&config.analysis);
    info!("Launch analyzer: {}", analyzer.name());

    let supervisor = Supervisor::new(config.clone(), analyzer)?;
    supervisor.restore().await;

    install_signal_handlers(supervisor.clone());

    if systemd {
        notify_systemd_ready();
    }

    print_ready_message(&config);

    let result = supervisor.run().await;

    let _ = std::fs::remove_file(&pid_path);
    info!("Shutdown complete");
    result
}

/// Refuses to start while another supervisor holds the PID file; a file
/// left behind by a dead process is removed.
fn check_stale_pid(pid_path: &PathBuf) -> WardenResult<()> {
    if !pid_path.exists() {
        return Ok(());
    }

    let contents = std::fs::read_to_string(pid_path)
        .map_err(|e| WardenError::Config(format!("Failed to read PID file: {}", e)))?;

    match contents.trim().parse::<i32>() {
        Ok(pid) if process_alive(pid) => Err(WardenError::Config(format!(
            "Another supervisor appears to be running (PID {} from {:?})",
            pid, pid_path
        ))),
        Ok(pid) => {
            warn!("Removing stale PID file for dead process {}", pid);
            let _ = std::fs::remove_file(pid_path);
            Ok(())
        }
        Err(_) => {
            warn!("Removing unreadable PID file {:?}", pid_path);
            let _ = std::fs::remove_file(pid_path);
            Ok(())
        }
    }
}

fn install_signal_handlers(supervisor: Arc<Supervisor>) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        supervisor.trigger_shutdown();
    });
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
        let mut sighup = signal(SignalKind::hangup()).expect("Failed to install SIGHUP handler");

        tokio::select! {
            _ = sigterm.recv() => { info!("Received SIGTERM"); }
            _ = sigint.recv() => { info!("Received SIGINT"); }
            _ = sighup.recv() => { info!("Received SIGHUP"); }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C");
    }
}

fn print_ready_message(config: &SupervisorConfig) {
    let critical = config.workers.iter().filter(|w| w.critical).count();
    let workers = format!("{} registered, {} critical", config.workers.len(), critical);
    let data_dir = config.data_dir.display().to_string();
    let cycle = format!(
        "every {}s (wake >{}s idle, rest >{}s active)",
        config.timing.cycle_interval_secs,
        config.timing.wake_threshold_secs,
        config.timing.rest_threshold_secs
    );
    let reflection = format!(
        "every {}s, analysis timeout {}s",
        config.timing.reflection_interval_secs, config.analysis.timeout_secs
    );

    println!();
    println!("\x1b[38;5;46m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[1;38;5;46mWarden is now running!\x1b[0m                                      \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  Workers:    \x1b[38;5;226m{:<46}\x1b[0m  \x1b[38;5;46m║\x1b[0m", workers);
    println!("\x1b[38;5;46m║\x1b[0m  Data dir:   \x1b[38;5;51m{:<46}\x1b[0m  \x1b[38;5;46m║\x1b[0m", data_dir);
    println!("\x1b[38;5;46m║\x1b[0m  Cycle:      \x1b[38;5;51m{:<46}\x1b[0m  \x1b[38;5;46m║\x1b[0m", cycle);
    println!("\x1b[38;5;46m║\x1b[0m  Reflection: \x1b[38;5;51m{:<46}\x1b[0m  \x1b[38;5;46m║\x1b[0m", reflection);
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mRun '\x1b[38;5;51mwarden status\x1b[38;5;245m' in another terminal to inspect workers\x1b[0m  \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mPress Ctrl+C to stop\x1b[0m                                        \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╚══════════════════════════════════════════════════════════════╝\x1b[0m");
    println!();
}

fn notify_systemd_ready() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") {
            use std::os::unix::net::UnixDatagram;
            if let Ok(socket) = UnixDatagram::unbound() {
                let _ = socket.send_to(b"READY=1", &socket_path);
                tracing::debug!("Notified systemd: READY=1");
            }
        }
    }
}
