//! Message types for the test monitor
//!
//! This module organizes the data that flows between monitor components
//! and out to subscribers:
//! - `execution`: Per-test execution entries and their status
//! - `events`: Lifecycle events published on the event channel
//! - `metrics`: Memory snapshots and aggregate run status

pub mod events;
pub mod execution;
pub mod metrics;

pub use events::{HangingSignal, MonitorEvent};
pub use execution::{TestExecutionEntry, TestKey, TestOutcome, TestStatus};
pub use metrics::{ExecutionStatus, MemorySnapshot};
