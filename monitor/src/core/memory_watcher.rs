//! Periodic memory sampling
//!
//! Stateless: every sample above the threshold publishes again.

use std::sync::Arc;

use shared::{process_warn, MemorySnapshot, MonitorEvent, ProcessId};

use super::events::EventChannel;
use crate::traits::MemoryProbe;

pub struct MemoryWatcher {
    probe: Arc<dyn MemoryProbe>,
    events: EventChannel,
    pid: Option<u32>,
    threshold_bytes: u64,
}

impl MemoryWatcher {
    pub fn new(probe: Arc<dyn MemoryProbe>, events: EventChannel, pid: Option<u32>, threshold_bytes: u64) -> Self {
        Self {
            probe,
            events,
            pid,
            threshold_bytes,
        }
    }

    /// Take one sample, publishing `highMemoryUsage` when over threshold
    pub fn sample(&self) -> MemorySnapshot {
        let snapshot = self.probe.sample(self.pid);
        if snapshot.exceeds(self.threshold_bytes) {
            process_warn!(
                ProcessId::current(),
                "🧠 High memory usage: {:.1} MiB resident (pid {})",
                snapshot.resident_mib(),
                snapshot.pid
            );
            self.events.publish(MonitorEvent::HighMemoryUsage(snapshot));
        }
        snapshot
    }
}
