//! Trait definitions with mockall annotations for testing
//!
//! These are the capability seams between the monitoring policy and the
//! operating system: spawning the runner, signalling it, and sampling memory.
//! Real implementations live in `services`; tests swap in mocks or fakes.

use shared::MemorySnapshot;
use tokio::sync::{mpsc, oneshot};

use crate::error::MonitorResult;

/// Which standard stream a chunk of runner output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Raw text read from the runner; may hold partial or multiple lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputChunk {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// How the runner process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, absent when the process died from a signal
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code), signal: None }
    }

    pub fn with_signal(signal: i32) -> Self {
        Self { code: None, signal: Some(signal) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Everything the monitor receives from a freshly spawned runner
pub struct SpawnedProcess {
    pub process: Box<dyn Process>,
    /// Resolves once when the process exits or waiting on it fails
    pub exit: oneshot::Receiver<MonitorResult<ExitOutcome>>,
    /// Closed when both output streams reach end of file
    pub output: mpsc::UnboundedReceiver<OutputChunk>,
}

/// Signal-level control over a running child process
#[mockall::automock]
pub trait Process: Send {
    fn pid(&self) -> Option<u32>;

    fn is_alive(&self) -> bool;

    /// Send the graceful signal, or the forceful one when `escalate` is set
    fn terminate(&self, escalate: bool) -> MonitorResult<()>;
}

/// Launches the test runner with piped output
#[mockall::automock]
pub trait ProcessSpawner: Send + Sync {
    /// `command[0]` is the executable, the rest are its arguments
    fn spawn(&self, command: &[String]) -> MonitorResult<SpawnedProcess>;
}

/// Memory sampling abstraction
#[mockall::automock]
pub trait MemoryProbe: Send + Sync {
    /// Sample `pid`, or the monitor's own process when `None`
    fn sample(&self, pid: Option<u32>) -> MemorySnapshot;
}

/// Whole-process termination as seen by the hang detector
#[mockall::automock]
pub trait Terminate {
    /// Begin terminating the runner; repeated calls are no-ops
    fn terminate(&mut self, reason: &str);

    fn is_terminating(&self) -> bool;
}
