//! Per-test execution state
//!
//! A `TestExecutionEntry` is created when the runner announces a test and
//! lives in the active registry until the test completes or is killed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use super::metrics::MemorySnapshot;

/// Execution status of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Running,
    Completed,
    Hanging,
    Killed,
}

impl TestStatus {
    /// Statuses that may be present in the active registry
    pub fn is_active(self) -> bool {
        matches!(self, TestStatus::Running | TestStatus::Hanging)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Running => write!(f, "running"),
            TestStatus::Completed => write!(f, "completed"),
            TestStatus::Hanging => write!(f, "hanging"),
            TestStatus::Killed => write!(f, "killed"),
        }
    }
}

/// Result reported by the runner's completion marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
}

/// Composite registry key: source file plus test name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestKey {
    pub file_path: String,
    pub test_name: String,
}

impl TestKey {
    pub fn new(file_path: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            test_name: test_name.into(),
        }
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {}", self.file_path, self.test_name)
    }
}

/// Timing and status record for one observed test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestExecutionEntry {
    pub test_name: String,
    pub file_path: String,
    /// Monotonic reading taken when the start marker was seen
    #[serde(skip)]
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
    /// Zero until completion is observed
    #[serde(rename = "duration_ms", with = "crate::types::millis")]
    pub duration: Duration,
    pub status: TestStatus,
    pub outcome: Option<TestOutcome>,
    pub memory_usage: MemorySnapshot,
}

impl TestExecutionEntry {
    /// Create a running entry stamped with the current time
    pub fn started(file_path: impl Into<String>, test_name: impl Into<String>, memory_usage: MemorySnapshot) -> Self {
        Self {
            test_name: test_name.into(),
            file_path: file_path.into(),
            start_time: Instant::now(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            status: TestStatus::Running,
            outcome: None,
            memory_usage,
        }
    }

    pub fn key(&self) -> TestKey {
        TestKey::new(self.file_path.clone(), self.test_name.clone())
    }

    /// Time since the start marker, measured against `now`
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    /// Bidirectional containment match used by completion markers, which
    /// carry no file path. Ambiguous when one active name contains another.
    pub fn matches_name(&self, name: &str) -> bool {
        self.test_name.contains(name) || name.contains(self.test_name.as_str())
    }
}
