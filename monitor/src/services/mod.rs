//! Service implementations
//!
//! This module contains real implementations of the capability traits.
//! These are the production implementations that touch the operating system.

pub mod memory_probe;
pub mod process_spawner;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use memory_probe::SysinfoMemoryProbe;
pub use process_spawner::{ChildProcess, TokioProcessSpawner};
