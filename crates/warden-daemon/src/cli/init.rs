use std::path::PathBuf;
use warden_daemon::config::WorkerEntry;
use warden_daemon::SupervisorConfig;
use warden_types::{WardenError, WardenResult};

pub fn init_supervisor(config_path: &PathBuf, data_dir: &PathBuf, force: bool) -> WardenResult<()> {
    println!("\x1b[38;5;46mInitializing Warden...\x1b[0m");
    println!();

    if config_path.exists() && !force {
        println!("\x1b[38;5;226mConfiguration already exists at {:?}\x1b[0m", config_path);
        println!("Use --force to overwrite");
        return Ok(());
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| WardenError::Config(format!("Failed to create data directory: {}", e)))?;

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| WardenError::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let mut config = SupervisorConfig::default();
    config.data_dir = data_dir.clone();
    config.workers.push(sample_worker());

    std::fs::create_dir_all(config.logs_dir())
        .map_err(|e| WardenError::Config(format!("Failed to create logs directory: {}", e)))?;

    config.save(config_path)?;
    println!("\x1b[38;5;46m[+]\x1b[0m Wrote default configuration with a sample worker");

    println!();
    println!("\x1b[38;5;46m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[1;38;5;46mWarden Initialized Successfully!\x1b[0m                            \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  Config: \x1b[38;5;51m{:50}\x1b[0m \x1b[38;5;46m║\x1b[0m", format!("{:?}", config_path));
    println!("\x1b[38;5;46m║\x1b[0m  Data:   \x1b[38;5;51m{:50}\x1b[0m \x1b[38;5;46m║\x1b[0m", format!("{:?}", data_dir));
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;226mNext steps:\x1b[0m                                                 \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  1. Edit warden.toml to define your workers                  \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  2. Check the config: \x1b[38;5;51mwarden config validate\x1b[0m                 \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  3. Start the supervisor: \x1b[38;5;51mwarden run\x1b[0m                         \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  4. Inspect workers: \x1b[38;5;51mwarden status\x1b[0m                           \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╚══════════════════════════════════════════════════════════════╝\x1b[0m");

    Ok(())
}

fn sample_worker() -> WorkerEntry {
    WorkerEntry {
        name: "heartbeat".into(),
        command: "/bin/sh".into(),
        args: vec!["-c".into(), "while true; do date; sleep 60; done".into()],
        purpose: "Sample worker, replace with a real workload".into(),
        ..Default::default()
    }
}
