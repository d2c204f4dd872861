//! Periodic sweep over the active registry
//!
//! Each sweep flags running entries older than the hanging threshold (once
//! per entry) and, with the kill switch enabled, kills the run when an entry
//! exceeds the maximum test duration. Termination is whole-process, so the
//! first kill ends the sweep.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use shared::{process_warn, HangingSignal, MonitorEvent, ProcessId, TestExecutionEntry, TestStatus};

use super::events::EventChannel;
use super::registry::ActiveTestRegistry;
use crate::config::MonitorConfig;
use crate::traits::Terminate;

const KILLABLE: &[TestStatus] = &[TestStatus::Running, TestStatus::Hanging];

/// What one sweep changed
#[derive(Debug, Default)]
pub struct SweepReport {
    pub newly_hanging: Vec<TestExecutionEntry>,
    pub killed: Option<TestExecutionEntry>,
}

pub struct HangDetector {
    registry: Arc<ActiveTestRegistry>,
    events: EventChannel,
    hanging_threshold: Duration,
    max_test_duration: Duration,
    kill_switch: bool,
}

impl HangDetector {
    pub fn new(registry: Arc<ActiveTestRegistry>, events: EventChannel, config: &MonitorConfig) -> Self {
        Self {
            registry,
            events,
            hanging_threshold: config.hanging_test_threshold,
            max_test_duration: config.max_test_duration,
            kill_switch: config.enable_kill_switch,
        }
    }

    pub fn sweep(&self, now: Instant, supervisor: &mut dyn Terminate) -> SweepReport {
        let mut report = SweepReport::default();
        if supervisor.is_terminating() {
            return report;
        }

        for entry in self.registry.snapshot() {
            let key = entry.key();
            let elapsed = entry.elapsed_at(now);

            if entry.status == TestStatus::Running && elapsed > self.hanging_threshold {
                if let Some(hanging) = self
                    .registry
                    .transition_if(&key, &[TestStatus::Running], TestStatus::Hanging)
                {
                    process_warn!(
                        ProcessId::current(),
                        "⏳ Test '{}' has been running for {:?} (threshold {:?})",
                        key,
                        elapsed,
                        self.hanging_threshold
                    );
                    self.events
                        .publish(MonitorEvent::TestHanging(HangingSignal::Stale(hanging.clone())));
                    report.newly_hanging.push(hanging);
                }
            }

            if self.kill_switch && elapsed > self.max_test_duration {
                let Some(mut killed) = self.registry.take_if(&key, KILLABLE) else {
                    continue;
                };
                killed.status = TestStatus::Killed;
                self.events.publish(MonitorEvent::TestKilled(killed.clone()));
                supervisor.terminate(&format!(
                    "test '{}' exceeded max duration of {:?} (running for {:?})",
                    key, self.max_test_duration, elapsed
                ));
                report.killed = Some(killed);
                break;
            }
        }

        if !report.newly_hanging.is_empty() {
            self.events
                .publish(MonitorEvent::HangingTestsDetected(report.newly_hanging.clone()));
        }

        report
    }
}
