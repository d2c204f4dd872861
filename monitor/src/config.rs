//! Monitor configuration
//!
//! `MonitorConfig` is supplied once per monitor and never mutated while a run
//! is in progress. Durations (de)serialize as integer milliseconds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};
use shared::types::millis;

pub const DEFAULT_MAX_TEST_DURATION: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_SUITE_DURATION: Duration = Duration::from_millis(30_000);
pub const DEFAULT_HANGING_TEST_THRESHOLD: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MEMORY_THRESHOLD: u64 = 512 * 1024 * 1024;

/// Hang sweep period
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(2);
/// Memory sample period
pub const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
/// Wait between the graceful and the forceful termination signal
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// A test running longer than this triggers the kill switch
    #[serde(rename = "max_test_duration_ms", with = "millis")]
    pub max_test_duration: Duration,

    /// Budget for the whole runner process
    #[serde(rename = "max_suite_duration_ms", with = "millis")]
    pub max_suite_duration: Duration,

    /// A test running longer than this is reported as hanging
    #[serde(rename = "hanging_test_threshold_ms", with = "millis")]
    pub hanging_test_threshold: Duration,

    /// Resident memory, in bytes, above which samples are reported
    #[serde(rename = "memory_threshold_bytes")]
    pub memory_threshold: u64,

    pub enable_kill_switch: bool,

    #[serde(rename = "sweep_interval_ms", with = "millis")]
    pub sweep_interval: Duration,

    #[serde(rename = "memory_sample_interval_ms", with = "millis")]
    pub memory_sample_interval: Duration,

    #[serde(rename = "kill_grace_period_ms", with = "millis")]
    pub kill_grace_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_test_duration: DEFAULT_MAX_TEST_DURATION,
            max_suite_duration: DEFAULT_MAX_SUITE_DURATION,
            hanging_test_threshold: DEFAULT_HANGING_TEST_THRESHOLD,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            enable_kill_switch: true,
            sweep_interval: SWEEP_INTERVAL,
            memory_sample_interval: MEMORY_SAMPLE_INTERVAL,
            kill_grace_period: KILL_GRACE_PERIOD,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_test_duration(mut self, duration: Duration) -> Self {
        self.max_test_duration = duration;
        self
    }

    pub fn with_max_suite_duration(mut self, duration: Duration) -> Self {
        self.max_suite_duration = duration;
        self
    }

    pub fn with_hanging_test_threshold(mut self, threshold: Duration) -> Self {
        self.hanging_test_threshold = threshold;
        self
    }

    pub fn with_memory_threshold(mut self, bytes: u64) -> Self {
        self.memory_threshold = bytes;
        self
    }

    pub fn with_kill_switch(mut self, enabled: bool) -> Self {
        self.enable_kill_switch = enabled;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_memory_sample_interval(mut self, interval: Duration) -> Self {
        self.memory_sample_interval = interval;
        self
    }

    pub fn with_kill_grace_period(mut self, grace: Duration) -> Self {
        self.kill_grace_period = grace;
        self
    }

    /// Reject values the run loop cannot work with
    pub fn validate(&self) -> MonitorResult<()> {
        // tokio intervals panic on a zero period
        if self.sweep_interval.is_zero() {
            return Err(MonitorError::config("sweep_interval_ms must be greater than zero"));
        }
        if self.memory_sample_interval.is_zero() {
            return Err(MonitorError::config("memory_sample_interval_ms must be greater than zero"));
        }
        if self.max_suite_duration.is_zero() {
            return Err(MonitorError::config("max_suite_duration_ms must be greater than zero"));
        }
        Ok(())
    }
}
