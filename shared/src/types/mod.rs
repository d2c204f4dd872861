//! Core types used throughout the test monitor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

pub mod millis;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Process identifier used to attribute log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// The supervising monitor itself (singleton)
    Monitor,
    /// A supervised test-runner child, by OS pid
    Runner(u32),
}

impl ProcessId {
    /// Initialize the global process ID for the monitor
    pub fn init_monitor() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Monitor)
    }

    /// Get the global process ID, defaulting to the monitor when uninitialized
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Monitor)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Monitor => write!(f, "monitor"),
            ProcessId::Runner(pid) => write!(f, "runner_{pid}"),
        }
    }
}

/// Unique identifier for one monitored run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
