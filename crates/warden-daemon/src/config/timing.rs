use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::{
    DEFAULT_CRASH_BACKOFF_SECS, DEFAULT_CYCLE_INTERVAL_SECS, DEFAULT_GRACE_TIMEOUT_SECS,
    DEFAULT_REFLECTION_INTERVAL_SECS, DEFAULT_REST_THRESHOLD_SECS, DEFAULT_WAKE_THRESHOLD_SECS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub cycle_interval_secs: u64,
    pub wake_threshold_secs: u64,
    pub rest_threshold_secs: u64,
    pub reflection_interval_secs: u64,
    pub grace_timeout_secs: u64,
    pub crash_backoff_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: DEFAULT_CYCLE_INTERVAL_SECS,
            wake_threshold_secs: DEFAULT_WAKE_THRESHOLD_SECS,
            rest_threshold_secs: DEFAULT_REST_THRESHOLD_SECS,
            reflection_interval_secs: DEFAULT_REFLECTION_INTERVAL_SECS,
            grace_timeout_secs: DEFAULT_GRACE_TIMEOUT_SECS,
            crash_backoff_secs: DEFAULT_CRASH_BACKOFF_SECS,
        }
    }
}

impl TimingConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn wake_threshold(&self) -> Duration {
        Duration::from_secs(self.wake_threshold_secs)
    }

    pub fn rest_threshold(&self) -> Duration {
        Duration::from_secs(self.rest_threshold_secs)
    }

    pub fn reflection_interval(&self) -> Duration {
        Duration::from_secs(self.reflection_interval_secs)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout_secs)
    }

    pub fn crash_backoff(&self) -> Duration {
        Duration::from_secs(self.crash_backoff_secs)
    }
}
