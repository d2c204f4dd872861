//! Test fixtures and data for monitor tests
//!
//! Runner output lines in the format the parser recognises.

use std::time::Duration;

use monitor::MonitorConfig;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const FILE: &'static str = "src/math.test.ts";
    pub const FIRST: &'static str = "adds numbers";
    pub const SECOND: &'static str = "divides numbers";

    /// Resident memory well below the default threshold
    pub const LOW_MEMORY: u64 = 64 * 1024 * 1024;
    /// Resident memory above the default 512 MiB threshold
    pub const HIGH_MEMORY: u64 = 600 * 1024 * 1024;

    pub const RUNNER_PID: u32 = 4242;

    pub fn command() -> Vec<String> {
        vec!["npx".to_string(), "vitest".to_string(), "--run".to_string()]
    }

    pub fn start_line(test_name: &str) -> String {
        format!("❯ {} {}\n", Self::FILE, test_name)
    }

    pub fn pass_line(test_name: &str, millis: u64) -> String {
        format!("✓ {} {}ms\n", test_name, millis)
    }

    pub fn fail_line(test_name: &str, millis: u64) -> String {
        format!("× {} {}ms\n", test_name, millis)
    }

    /// Default config with a short suite budget
    pub fn short_suite_config() -> MonitorConfig {
        MonitorConfig::default().with_max_suite_duration(Duration::from_secs(1))
    }
}
