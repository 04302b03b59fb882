use super::commands::ConfigAction;
use std::path::PathBuf;
use warden_daemon::SupervisorConfig;
use warden_types::{WardenError, WardenResult};

pub fn handle_config(config_path: &PathBuf, action: Option<ConfigAction>) -> WardenResult<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .map_err(|e| WardenError::Config(format!("Failed to read config: {}", e)))?;
                println!("{}", content);
            } else {
                println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
                println!("Run '\x1b[38;5;51mwarden init\x1b[0m' to create one");
            }
        }
        Some(ConfigAction::Validate) => {
            if config_path.exists() {
                match SupervisorConfig::load(config_path) {
                    Ok(config) => {
                        println!("\x1b[38;5;46m[+]\x1b[0m Configuration is valid");
                        println!("    {} workers defined", config.workers.len());
                    }
                    Err(e) => println!("\x1b[38;5;196m[-]\x1b[0m Configuration error: {}", e),
                }
            } else {
                println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
            }
        }
    }
    Ok(())
}
