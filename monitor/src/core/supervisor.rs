//! Termination policy for the supervised runner
//!
//! The supervisor owns the `Process` handle for one run. `terminate` is
//! idempotent: the first call records the reason and sends the graceful
//! signal; the run loop then calls `on_deadline` when `next_deadline` passes
//! to escalate to the forceful signal, and once more if even that did not
//! take effect.

use std::time::Duration;
use tokio::time::Instant;

use shared::{process_debug, process_error, process_warn, ProcessId};

use crate::traits::{Process, Terminate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    Idle,
    AwaitingGraceful { deadline: Instant },
    AwaitingForceful { deadline: Instant },
    GaveUp,
}

pub struct ProcessSupervisor {
    process: Box<dyn Process>,
    grace_period: Duration,
    /// First termination reason; set at most once
    reason: Option<String>,
    escalation: Escalation,
    exited: bool,
    /// The forceful signal has been sent
    forced: bool,
}

impl ProcessSupervisor {
    pub fn new(process: Box<dyn Process>, grace_period: Duration) -> Self {
        Self {
            process,
            grace_period,
            reason: None,
            escalation: Escalation::Idle,
            exited: false,
            forced: false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    fn log_id(&self) -> ProcessId {
        self.pid().map(ProcessId::Runner).unwrap_or(ProcessId::Monitor)
    }

    fn is_alive(&self) -> bool {
        !self.exited && self.process.is_alive()
    }

    fn kill(&mut self) {
        self.forced = true;
        if let Err(e) = self.process.terminate(true) {
            process_error!(ProcessId::current(), "❌ Failed to kill test runner: {}", e);
        }
    }

    /// Record that the exit has been observed; no further signals are sent
    pub fn mark_exited(&mut self) {
        self.exited = true;
        self.escalation = Escalation::Idle;
    }

    pub fn termination_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// When the run loop must next call `on_deadline`
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.escalation {
            Escalation::AwaitingGraceful { deadline } | Escalation::AwaitingForceful { deadline } => Some(deadline),
            Escalation::Idle | Escalation::GaveUp => None,
        }
    }

    /// Advance escalation after a deadline. Returns `true` when the process
    /// survived the forceful signal and the caller should stop waiting.
    pub fn on_deadline(&mut self) -> bool {
        match self.escalation {
            Escalation::AwaitingGraceful { .. } => {
                if !self.is_alive() {
                    self.escalation = Escalation::Idle;
                    return false;
                }
                process_warn!(
                    ProcessId::current(),
                    "🔨 Test runner {} ignored graceful termination for {:?}, sending kill signal",
                    self.log_id(),
                    self.grace_period
                );
                self.kill();
                self.escalation = Escalation::AwaitingForceful {
                    deadline: Instant::now() + self.grace_period,
                };
                false
            }
            Escalation::AwaitingForceful { .. } => {
                if !self.is_alive() {
                    self.escalation = Escalation::Idle;
                    return false;
                }
                process_error!(
                    ProcessId::current(),
                    "🚨 Test runner {} still alive after kill signal; abandoning it",
                    self.log_id()
                );
                self.escalation = Escalation::GaveUp;
                true
            }
            Escalation::Idle | Escalation::GaveUp => false,
        }
    }
}

impl Terminate for ProcessSupervisor {
    fn terminate(&mut self, reason: &str) {
        if let Some(existing) = &self.reason {
            process_debug!(
                ProcessId::current(),
                "Termination already requested ({}), ignoring '{}'",
                existing,
                reason
            );
            return;
        }
        self.reason = Some(reason.to_string());

        if !self.is_alive() {
            process_debug!(ProcessId::current(), "Test runner already exited, nothing to terminate ({})", reason);
            return;
        }

        process_warn!(ProcessId::current(), "🛑 Terminating test runner {}: {}", self.log_id(), reason);
        if let Err(e) = self.process.terminate(false) {
            process_error!(ProcessId::current(), "❌ Failed to signal test runner: {}", e);
        }
        self.escalation = Escalation::AwaitingGraceful {
            deadline: Instant::now() + self.grace_period,
        };
    }

    fn is_terminating(&self) -> bool {
        self.reason.is_some()
    }
}

/// A run abandoned before the exit was observed must not leave the runner behind
impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.forced || !self.is_alive() {
            return;
        }
        process_warn!(
            ProcessId::current(),
            "🔨 Monitoring of test runner {} abandoned, killing it",
            self.log_id()
        );
        self.kill();
    }
}
