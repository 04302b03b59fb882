use super::commands::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, layer::SubscriberExt};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "info,warden_daemon=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter);

    if let Some(ref log_file) = cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .expect("Failed to open log file");
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false);
        subscriber.with(file_layer).init();
    } else {
        let stdout_layer = fmt::layer()
            .with_target(cli.verbose >= 2);
        subscriber.with(stdout_layer).init();
    }
}

#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
pub fn process_alive(_pid: i32) -> bool {
    false
}

pub fn print_banner() {
    println!("\x1b[38;5;46m");
    println!(r#"
    ██╗    ██╗ █████╗ ██████╗ ██████╗ ███████╗███╗   ██╗
    ██║    ██║██╔══██╗██╔══██╗██╔══██╗██╔════╝████╗  ██║
    ██║ █╗ ██║███████║██████╔╝██║  ██║█████╗  ██╔██╗ ██║
    ██║███╗██║██╔══██║██╔══██╗██║  ██║██╔══╝  ██║╚██╗██║
    ╚███╔███╔╝██║  ██║██║  ██║██████╔╝███████╗██║ ╚████║
     ╚══╝╚══╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚═════╝ ╚══════╝╚═╝  ╚═══╝"#);
    println!("\x1b[0m");
    println!("        \x1b[38;5;245mSelf-Correcting Process Supervisor - v{}\x1b[0m", BUILD_VERSION);
    println!();
}
