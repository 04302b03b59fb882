use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;
use warden_types::{WardenError, WardenResult};

use super::analysis::AnalysisConfig;
use super::constants::{AUDIT_LOG_FILE, LOGS_DIR, MODIFICATIONS_FILE, PID_FILE, SNAPSHOT_FILE};
use super::timing::TimingConfig;
use super::workers::WorkerEntry;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub data_dir: PathBuf,
    pub timing: TimingConfig,
    pub analysis: AnalysisConfig,
    pub workers: Vec<WorkerEntry>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/warden"));

        Self {
            data_dir: home.join(".warden"),
            timing: TimingConfig::default(),
            analysis: AnalysisConfig::default(),
            workers: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> WardenResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| WardenError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| WardenError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> WardenResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| WardenError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WardenError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| WardenError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("WARDEN_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("WARDEN_CYCLE_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.timing.cycle_interval_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("WARDEN_REFLECTION_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.timing.reflection_interval_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("WARDEN_GRACE_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.timing.grace_timeout_secs = s;
            }
        }

        if let Ok(cmd) = std::env::var("WARDEN_ANALYSIS_COMMAND") {
            if cmd.is_empty() {
                self.analysis.command = None;
            } else {
                self.analysis.command = Some(PathBuf::from(cmd));
            }
        }
    }

    pub fn validate(&self) -> WardenResult<()> {
        if self.timing.cycle_interval_secs == 0 {
            return Err(WardenError::Config("cycle_interval_secs cannot be 0".into()));
        }

        if self.timing.reflection_interval_secs == 0 {
            return Err(WardenError::Config(
                "reflection_interval_secs cannot be 0".into(),
            ));
        }

        if self.timing.grace_timeout_secs == 0 {
            return Err(WardenError::Config("grace_timeout_secs cannot be 0".into()));
        }

        if self.analysis.timeout_secs == 0 {
            return Err(WardenError::Config(
                "analysis timeout_secs cannot be 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(WardenError::Config("worker name cannot be empty".into()));
            }

            if worker.command.trim().is_empty() {
                return Err(WardenError::Config(format!(
                    "worker '{}' has no command",
                    worker.name
                )));
            }

            if !seen.insert(worker.name.as_str()) {
                return Err(WardenError::Config(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
        }

        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.data_dir.join(PID_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.logs_dir().join(AUDIT_LOG_FILE)
    }

    pub fn modifications_path(&self) -> PathBuf {
        self.logs_dir().join(MODIFICATIONS_FILE)
    }
}
