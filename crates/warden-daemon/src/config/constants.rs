pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WAKE_THRESHOLD_SECS: u64 = 60;
pub const DEFAULT_REST_THRESHOLD_SECS: u64 = 300;
pub const DEFAULT_REFLECTION_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_GRACE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CRASH_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 5;

pub const CONFIG_FILE: &str = "warden.toml";
pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const PID_FILE: &str = "warden.pid";
pub const LOGS_DIR: &str = "logs";
pub const AUDIT_LOG_FILE: &str = "audit.log";
pub const MODIFICATIONS_FILE: &str = "modifications.jsonl";
