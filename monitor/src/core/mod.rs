//! Core monitoring logic
//!
//! This module contains the monitoring policy with no direct OS access:
//! process control and memory sampling arrive through the traits in
//! `crate::traits`, so everything here is testable with mocks and paused time.

pub mod events;
pub mod hang_detector;
pub mod memory_watcher;
pub mod parser;
pub mod registry;
pub mod supervisor;

pub use events::EventChannel;
pub use hang_detector::{HangDetector, SweepReport};
pub use memory_watcher::MemoryWatcher;
pub use parser::OutputParser;
pub use registry::ActiveTestRegistry;
pub use supervisor::ProcessSupervisor;
