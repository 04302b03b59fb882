mod cli;

use clap::Parser;
use cli::{
    handle_config, init_logging, init_supervisor, run_supervisor, show_status, show_version, Cli,
    Commands,
};
use std::path::PathBuf;
use warden_daemon::config::CONFIG_FILE;
use warden_types::WardenResult;

#[tokio::main]
async fn main() -> WardenResult<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".warden"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/warden"))
    });

    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join(CONFIG_FILE));

    match cli.command {
        Commands::Run { pid_file, systemd } => {
            run_supervisor(&config_path, cli.data_dir.clone(), pid_file, systemd).await?;
        }
        Commands::Init { force } => {
            init_supervisor(&config_path, &data_dir, force)?;
        }
        Commands::Status => {
            show_status(&config_path, cli.data_dir.clone(), &cli.format)?;
        }
        Commands::Config { action } => {
            handle_config(&config_path, action)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}
