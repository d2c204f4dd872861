//! Real memory probe backed by `sysinfo`

use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, System};

use shared::{process_debug, MemorySnapshot, ProcessId};

use crate::traits::MemoryProbe;

/// Samples resident and virtual memory of a process
pub struct SysinfoMemoryProbe {
    system: Mutex<System>,
}

impl SysinfoMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn read(system: &mut System, pid: Pid) -> Option<MemorySnapshot> {
        if !system.refresh_process(pid) {
            return None;
        }
        let process = system.process(pid)?;
        Some(MemorySnapshot::new(pid.as_u32(), process.memory(), process.virtual_memory()))
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn sample(&self, pid: Option<u32>) -> MemorySnapshot {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(snapshot) = pid.and_then(|pid| Self::read(&mut system, Pid::from_u32(pid))) {
            return snapshot;
        }

        // Runner gone (or not started): fall back to our own process
        match sysinfo::get_current_pid() {
            Ok(own) => Self::read(&mut system, own).unwrap_or_default(),
            Err(e) => {
                process_debug!(ProcessId::current(), "Unable to determine own pid for memory sampling: {}", e);
                MemorySnapshot::default()
            }
        }
    }
}
