//! Shared types for the test execution monitor
//!
//! Contains the identity, message and logging pieces used by the monitor
//! library and its command-line front end.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Test execution state
    TestExecutionEntry, TestKey, TestOutcome, TestStatus,

    // Published events
    HangingSignal, MonitorEvent,

    // Memory and status reporting
    ExecutionStatus, MemorySnapshot,
};
