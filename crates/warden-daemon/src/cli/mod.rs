mod commands;
mod config_cmd;
mod init;
mod run;
mod status;
mod utils;

pub use commands::{Cli, Commands, ConfigAction, OutputFormat};
pub use config_cmd::handle_config;
pub use init::init_supervisor;
pub use run::run_supervisor;
pub use status::{show_status, show_version};
pub use utils::init_logging;
