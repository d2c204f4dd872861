//! Real process spawning service implementation
//!
//! Spawns the test runner with `tokio::process`, forwards both output streams
//! as raw chunks as soon as they are read, and reports the exit through a oneshot channel from a
//! waiter task. Signals are delivered by pid with `nix`; the waiter task owns
//! the `Child`, so the monitor never needs `&mut` access to it while waiting.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use shared::{process_debug, ProcessId};

use crate::error::{MonitorError, MonitorResult};
use crate::traits::{ExitOutcome, OutputChunk, OutputStream, Process, ProcessSpawner, SpawnedProcess};

/// Spawner for real child processes
#[derive(Debug, Default, Clone)]
pub struct TokioProcessSpawner {
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl TokioProcessSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the command from this directory (fluent API)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable for the child (fluent API)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(&self, command: &[String]) -> MonitorResult<SpawnedProcess> {
        let (program, args) = command.split_first().ok_or_else(|| MonitorError::InvalidCommand {
            reason: "command must name an executable".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| MonitorError::SpawnFailed {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_output_consumer(stdout, OutputStream::Stdout, output_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_consumer(stderr, OutputStream::Stderr, output_tx.clone());
        }
        drop(output_tx);

        let exited = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = oneshot::channel();
        let waiter_exited = exited.clone();
        tokio::spawn(async move {
            let result = child.wait().await;
            waiter_exited.store(true, Ordering::SeqCst);
            let outcome = result
                .map(exit_outcome)
                .map_err(|e| MonitorError::process(format!("Failed waiting on test runner: {e}")));
            let _ = exit_tx.send(outcome);
        });

        process_debug!(
            ProcessId::current(),
            "🧪 Spawned test runner '{}' (PID: {})",
            command.join(" "),
            pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
        );

        Ok(SpawnedProcess {
            process: Box::new(ChildProcess { pid, exited }),
            exit: exit_rx,
            output: output_rx,
        })
    }
}

/// Read size for runner output; chunks are forwarded as soon as they arrive
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Read a stream to EOF, forwarding text as it arrives. Line splitting is
/// left to the parser. Invalid UTF-8 is replaced rather than ending the stream.
fn spawn_output_consumer<R>(mut reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut decoder = Utf8Decoder::default();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    let rest = decoder.finish();
                    if !rest.is_empty() {
                        let _ = tx.send(OutputChunk { stream, text: rest });
                    }
                    break;
                }
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if !text.is_empty() && tx.send(OutputChunk { stream, text }).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Holds back a multi-byte sequence split across two reads
#[derive(Debug, Default)]
struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.carry.clear();
                    return text;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.carry[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid + len);
                        }
                        // Incomplete sequence at the end: wait for the next read
                        None => {
                            self.carry.drain(..valid);
                            return text;
                        }
                    }
                }
            }
        }
    }

    /// Whatever is left at end of stream, lossily decoded
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        text
    }
}

fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitOutcome {
        code: status.code(),
        signal,
    }
}

/// Handle to a child owned by its waiter task
#[derive(Debug)]
pub struct ChildProcess {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
}

impl Process for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    #[cfg(unix)]
    fn terminate(&self, escalate: bool) -> MonitorResult<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        // An exited child may already be reaped and its pid reused
        if !self.is_alive() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let raw = i32::try_from(pid).map_err(|_| MonitorError::Signal {
            pid,
            message: "pid out of range".to_string(),
        })?;

        let sig = if escalate { Signal::SIGKILL } else { Signal::SIGTERM };
        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) => {
                process_debug!(ProcessId::current(), "📤 Sent {:?} to process {}", sig, pid);
                Ok(())
            }
            // Process doesn't exist - that's fine
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(MonitorError::Signal {
                pid,
                message: e.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, _escalate: bool) -> MonitorResult<()> {
        Err(MonitorError::Signal {
            pid: self.pid.unwrap_or(0),
            message: "signal delivery is only supported on unix".to_string(),
        })
    }
}
