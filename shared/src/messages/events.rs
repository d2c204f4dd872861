//! Lifecycle events published by the monitor

use serde::Serialize;

use super::execution::TestExecutionEntry;
use super::metrics::MemorySnapshot;
use crate::errors::{SharedError, SharedResult};

/// Why a test is believed to be hanging
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "detail", rename_all = "lowercase")]
pub enum HangingSignal {
    /// Sweep found a running entry older than the hanging threshold
    Stale(TestExecutionEntry),
    /// Runner wrote timeout/hang text on stderr
    Stderr(String),
}

/// Every notification the monitor publishes to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum MonitorEvent {
    TestStarted(TestExecutionEntry),
    TestCompleted(TestExecutionEntry),
    SlowTest(TestExecutionEntry),
    /// Raw runner line that mentioned queueing
    TestQueued(String),
    TestHanging(HangingSignal),
    HangingTestsDetected(Vec<TestExecutionEntry>),
    TestKilled(TestExecutionEntry),
    HighMemoryUsage(MemorySnapshot),
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::TestStarted(_) => "testStarted",
            MonitorEvent::TestCompleted(_) => "testCompleted",
            MonitorEvent::SlowTest(_) => "slowTest",
            MonitorEvent::TestQueued(_) => "testQueued",
            MonitorEvent::TestHanging(_) => "testHanging",
            MonitorEvent::HangingTestsDetected(_) => "hangingTestsDetected",
            MonitorEvent::TestKilled(_) => "testKilled",
            MonitorEvent::HighMemoryUsage(_) => "highMemoryUsage",
        }
    }

    /// Serialize as a single JSON line
    pub fn to_json(&self) -> SharedResult<String> {
        serde_json::to_string(self).map_err(|e| SharedError::SerializationError { message: e.to_string() })
    }
}
