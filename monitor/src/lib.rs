//! Test execution monitor library
//!
//! Runs a test runner as a child process, follows its progress through the
//! markers it prints, and reports hanging, slow and runaway tests as events.
//! Tests that exceed their budget can end the run through the kill switch.

pub mod config;
pub mod core;
pub mod error;
pub mod monitor;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use core::{ActiveTestRegistry, EventChannel};
pub use error::{MonitorError, MonitorResult};
pub use monitor::TestMonitor;
pub use traits::{ExitOutcome, MemoryProbe, OutputChunk, OutputStream, Process, ProcessSpawner, SpawnedProcess};
