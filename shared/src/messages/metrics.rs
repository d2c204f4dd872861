//! Memory and run status message types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::RunId;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Point-in-time memory reading for one process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub pid: u32,
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

impl MemorySnapshot {
    pub fn new(pid: u32, resident_bytes: u64, virtual_bytes: u64) -> Self {
        Self {
            pid,
            resident_bytes,
            virtual_bytes,
        }
    }

    pub fn exceeds(&self, threshold_bytes: u64) -> bool {
        self.resident_bytes > threshold_bytes
    }

    pub fn resident_mib(&self) -> f64 {
        self.resident_bytes as f64 / BYTES_PER_MIB
    }
}

/// Aggregate snapshot returned by the status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    /// Absent before the first run starts
    pub run_id: Option<RunId>,
    #[serde(rename = "elapsed_ms", with = "crate::types::millis")]
    pub elapsed: Duration,
    pub active_tests: usize,
    pub hanging_tests: usize,
    pub memory: MemorySnapshot,
}
