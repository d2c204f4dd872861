//! Runner output parsing
//!
//! Turns raw stdout/stderr text into registry mutations and lifecycle events.
//! Recognised stdout markers (after ANSI colour codes are stripped):
//!
//! - `❯ <file> <test name>`: a test started
//! - `✓ <test name> <N>ms`: a test passed (`√` also accepted)
//! - `× <test name> <N>ms`: a test failed (`✗`, `✕` also accepted)
//! - any other line containing `queued`: a test was queued
//!
//! On stderr, any line mentioning `timeout` or `hung` is reported as a
//! hanging signal as soon as the text arrives, once per line. Everything
//! else is ignored. The parser never makes process control decisions.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use shared::{process_debug, HangingSignal, MonitorEvent, ProcessId, TestExecutionEntry, TestOutcome};

use super::events::EventChannel;
use super::registry::ActiveTestRegistry;
use crate::traits::{MemoryProbe, OutputChunk, OutputStream};

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI escape pattern"));

static START_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*❯\s+(\S+)\s+(.+?)\s*$").expect("valid start marker pattern"));

static FINISH_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([✓√×✗✕])\s+(.+?)\s+(\d+(?:\.\d+)?)\s*ms\s*$").expect("valid finish marker pattern")
});

/// A recognised line of runner output
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Started { file_path: String, test_name: String },
    Finished { test_name: String, duration: Duration, outcome: TestOutcome },
    Queued,
}

/// Classify one stdout line; `None` for anything unrecognised
pub fn parse_line(line: &str) -> Option<Marker> {
    if let Some(caps) = START_MARKER.captures(line) {
        return Some(Marker::Started {
            file_path: caps[1].to_string(),
            test_name: caps[2].to_string(),
        });
    }

    if let Some(caps) = FINISH_MARKER.captures(line) {
        let duration = parse_millis(&caps[3])?;
        let outcome = match &caps[1] {
            "✓" | "√" => TestOutcome::Passed,
            _ => TestOutcome::Failed,
        };
        return Some(Marker::Finished {
            test_name: caps[2].to_string(),
            duration,
            outcome,
        });
    }

    if line.contains("queued") {
        return Some(Marker::Queued);
    }

    None
}

fn parse_millis(text: &str) -> Option<Duration> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    // Digit runs too large for u64 leave the line unmatched
    let millis = Duration::from_millis(whole.parse::<u64>().ok()?);
    // Keep nanosecond precision, drop anything finer
    let nanos: String = fraction.chars().chain(std::iter::repeat('0')).take(6).collect();
    millis.checked_add(Duration::from_nanos(nanos.parse::<u64>().ok()?))
}

/// Whether a stderr line reports a timed-out or hung test
pub fn is_hang_report(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("timeout") || lower.contains("hung")
}

pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Longest partial line kept while waiting for its newline
const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// Reassembles lines from chunks that may split them anywhere
#[derive(Debug, Default)]
struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    /// Complete lines in `text`; a partial line over the cap is cut off as one
    fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        if self.partial.len() > MAX_PARTIAL_LINE {
            lines.push(std::mem::take(&mut self.partial));
        }
        lines
    }

    fn pending(&self) -> &str {
        &self.partial
    }

    fn take_remainder(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

pub struct OutputParser {
    registry: Arc<ActiveTestRegistry>,
    events: EventChannel,
    memory: Arc<dyn MemoryProbe>,
    /// Runner pid, used for memory snapshots and log attribution
    pid: Option<u32>,
    hanging_threshold: Duration,
    stdout: LineBuffer,
    stderr: LineBuffer,
    /// The pending stderr partial line was already reported as a hang
    stderr_pending_reported: bool,
}

impl OutputParser {
    pub fn new(
        registry: Arc<ActiveTestRegistry>,
        events: EventChannel,
        memory: Arc<dyn MemoryProbe>,
        pid: Option<u32>,
        hanging_threshold: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            memory,
            pid,
            hanging_threshold,
            stdout: LineBuffer::default(),
            stderr: LineBuffer::default(),
            stderr_pending_reported: false,
        }
    }

    /// Consume one chunk; only complete lines are acted on
    pub fn feed(&mut self, chunk: &OutputChunk) {
        match chunk.stream {
            OutputStream::Stdout => {
                for line in self.stdout.push(&chunk.text) {
                    self.handle_stdout_line(&line);
                }
            }
            OutputStream::Stderr => {
                for line in self.stderr.push(&chunk.text) {
                    // First completed line is the partial we may have reported already
                    let reported = std::mem::take(&mut self.stderr_pending_reported);
                    self.handle_stderr_line(&line, !reported);
                }
                // Hang reports are not held back waiting for a newline
                if !self.stderr_pending_reported {
                    let pending = strip_ansi(self.stderr.pending());
                    if is_hang_report(&pending) {
                        let text = pending.into_owned();
                        self.publish_hang_report(text);
                        self.stderr_pending_reported = true;
                    }
                }
            }
        }
    }

    /// Process any trailing text that never received a newline
    pub fn flush(&mut self) {
        if let Some(line) = self.stdout.take_remainder() {
            self.handle_stdout_line(&line);
        }
        if let Some(line) = self.stderr.take_remainder() {
            let reported = std::mem::take(&mut self.stderr_pending_reported);
            self.handle_stderr_line(&line, !reported);
        }
    }

    fn runner(&self) -> ProcessId {
        self.pid.map(ProcessId::Runner).unwrap_or(ProcessId::Monitor)
    }

    fn handle_stdout_line(&mut self, raw: &str) {
        let line = strip_ansi(raw);
        process_debug!(self.runner(), "stdout | {}", line);

        match parse_line(&line) {
            Some(Marker::Started { file_path, test_name }) => {
                let entry = TestExecutionEntry::started(file_path, test_name, self.memory.sample(self.pid));
                self.registry.upsert(entry.clone());
                self.events.publish(MonitorEvent::TestStarted(entry));
            }
            Some(Marker::Finished { test_name, duration, outcome }) => {
                let Some(entry) = self.registry.complete_matching(&test_name, duration, outcome) else {
                    return;
                };
                let slow = entry.duration > self.hanging_threshold;
                self.events.publish(MonitorEvent::TestCompleted(entry.clone()));
                if slow {
                    self.events.publish(MonitorEvent::SlowTest(entry));
                }
            }
            Some(Marker::Queued) => {
                self.events.publish(MonitorEvent::TestQueued(line.into_owned()));
            }
            None => {}
        }
    }

    fn handle_stderr_line(&mut self, raw: &str, check_hang: bool) {
        let line = strip_ansi(raw);
        process_debug!(self.runner(), "stderr | {}", line);

        if check_hang && is_hang_report(&line) {
            self.publish_hang_report(line.into_owned());
        }
    }

    fn publish_hang_report(&self, text: String) {
        self.events.publish(MonitorEvent::TestHanging(HangingSignal::Stderr(text)));
    }
}
