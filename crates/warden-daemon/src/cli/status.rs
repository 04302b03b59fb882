use super::commands::OutputFormat;
use super::utils::{print_banner, process_alive};
use std::path::PathBuf;
use warden_daemon::SupervisorConfig;
use warden_types::{Snapshot, WardenError, WardenResult, WorkerState};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(all(target_arch = "x86_64", target_os = "macos"))]
const BUILD_TARGET: &str = "x86_64-apple-darwin";
#[cfg(all(target_arch = "aarch64", target_os = "macos"))]
const BUILD_TARGET: &str = "aarch64-apple-darwin";
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
const BUILD_TARGET: &str = "x86_64-unknown-linux-gnu";
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
const BUILD_TARGET: &str = "aarch64-unknown-linux-gnu";
#[cfg(all(target_arch = "x86_64", target_os = "windows"))]
const BUILD_TARGET: &str = "x86_64-pc-windows-msvc";
#[cfg(not(any(
    all(target_arch = "x86_64", target_os = "macos"),
    all(target_arch = "aarch64", target_os = "macos"),
    all(target_arch = "x86_64", target_os = "linux"),
    all(target_arch = "aarch64", target_os = "linux"),
    all(target_arch = "x86_64", target_os = "windows"),
)))]
const BUILD_TARGET: &str = "unknown";

pub fn show_status(
    config_path: &PathBuf,
    data_dir: Option<PathBuf>,
    format: &OutputFormat,
) -> WardenResult<()> {
    let mut config = SupervisorConfig::load(config_path)?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }

    let pid_path = config.pid_file_path();
    let live_pid = read_live_pid(&pid_path);
    let snapshot = read_snapshot(&config.snapshot_path())?;

    match format {
        OutputFormat::Json => {
            let status = serde_json::json!({
                "version": BUILD_VERSION,
                "running": live_pid.is_some(),
                "pid": live_pid,
                "data_dir": config.data_dir.to_string_lossy(),
                "snapshot": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&status).unwrap());
        }
        OutputFormat::Text => {
            if let Some(pid) = live_pid {
                println!("\x1b[38;5;46m* Warden: RUNNING\x1b[0m (PID {})", pid);
            } else if pid_path.exists() {
                println!("\x1b[38;5;196m* Warden: STOPPED\x1b[0m (stale PID file exists)");
            } else {
                println!("\x1b[38;5;245m* Warden: NOT RUNNING\x1b[0m");
            }

            match snapshot {
                Some(snapshot) => print_snapshot(&snapshot),
                None => {
                    println!();
                    println!("No snapshot found in {:?}", config.data_dir);
                    println!("Start with: \x1b[38;5;51mwarden run\x1b[0m");
                }
            }
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    // the persisted summary block is derived data and may be absent
    let summary = Snapshot::tally(&snapshot.workers);

    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("Cycles:          \x1b[38;5;51m{}\x1b[0m", snapshot.cycle_count);
    println!(
        "Last snapshot:   \x1b[38;5;245m{}\x1b[0m",
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Workers:         \x1b[38;5;51m{}\x1b[0m", summary.total);
    println!("  Running:       \x1b[38;5;46m{}\x1b[0m", summary.running);
    println!("  Stopped:       \x1b[38;5;245m{}\x1b[0m", summary.stopped);
    println!("  Crashed:       \x1b[38;5;196m{}\x1b[0m", summary.crashed);
    println!(
        "Lifetime:        \x1b[38;5;245m{} starts, {} crashes, {} modifications\x1b[0m",
        snapshot.counters.workers_started,
        snapshot.counters.crashes_observed,
        snapshot.counters.modifications_applied
    );

    if snapshot.workers.is_empty() {
        return;
    }

    println!();
    println!("\x1b[38;5;46mWorkers\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    for worker in &snapshot.workers {
        let last_exit = match worker.last_exit_code {
            Some(code) => code.to_string(),
            None => "-".to_string(),
        };
        println!(
            "  {:<20} {}{:<8}\x1b[0m  crashes: {:<3}  last exit: {}",
            worker.name,
            state_color(worker.state),
            worker.state,
            worker.consecutive_crashes,
            last_exit
        );
    }
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
}

fn state_color(state: WorkerState) -> &'static str {
    match state {
        WorkerState::Running => "\x1b[38;5;46m",
        WorkerState::Starting | WorkerState::Stopping => "\x1b[38;5;226m",
        WorkerState::Crashed => "\x1b[38;5;196m",
        WorkerState::Stopped => "\x1b[38;5;245m",
    }
}

fn read_live_pid(pid_path: &PathBuf) -> Option<u32> {
    let contents = std::fs::read_to_string(pid_path).ok()?;
    let pid = contents.trim().parse::<i32>().ok()?;
    if process_alive(pid) {
        Some(pid as u32)
    } else {
        None
    }
}

fn read_snapshot(path: &PathBuf) -> WardenResult<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| WardenError::Persistence(format!("Failed to read snapshot: {}", e)))?;
    let snapshot = serde_json::from_str(&contents)
        .map_err(|e| WardenError::Persistence(format!("Failed to parse snapshot: {}", e)))?;

    Ok(Some(snapshot))
}

pub fn show_version() {
    print_banner();
    println!("\x1b[38;5;46mBuild Information\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("  Version:   \x1b[38;5;51m{}\x1b[0m", BUILD_VERSION);
    println!("  Target:    \x1b[38;5;245m{}\x1b[0m", BUILD_TARGET);
    println!("  Profile:   \x1b[38;5;245m{}\x1b[0m", if cfg!(debug_assertions) { "debug" } else { "release" });
    println!();
    println!("\x1b[38;5;46mComponents\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("  Runtime:     \x1b[38;5;51mtokio\x1b[0m (Process supervision + timers)");
    println!("  Analysis:    \x1b[38;5;51mexternal command\x1b[0m (JSON over stdio)");
    println!("  Persistence: \x1b[38;5;51mJSON snapshots\x1b[0m (Atomic rename)");
    println!("  Audit:       \x1b[38;5;51mappend-only log\x1b[0m (+ JSONL modifications)");
    println!();
    println!("\x1b[38;5;245mLicense:     MIT\x1b[0m");
    println!("\x1b[38;5;245mRepository:  https://github.com/warden-project/warden\x1b[0m");
}
