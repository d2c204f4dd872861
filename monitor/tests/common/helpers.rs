//! Test helpers for monitor integration tests
//!
//! `FakeRunner` stands in for a test runner process: the test writes its
//! output and decides when it exits, and the fake records every signal the
//! monitor sends. Tests run with paused time, so `advance` moves the clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use monitor::traits::MockMemoryProbe;
use monitor::{
    ExitOutcome, MonitorConfig, MonitorError, MonitorResult, OutputChunk, Process, ProcessSpawner, SpawnedProcess,
    TestMonitor,
};
use shared::{MemorySnapshot, MonitorEvent};

use super::fixtures::TestFixtures;

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

/// How the fake runner reacts to termination signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalResponse {
    ExitOnTerm,
    /// Ignores the graceful signal, dies on the forceful one
    ExitOnKill,
    Ignore,
}

struct FakeState {
    response: SignalResponse,
    /// `true` for each forceful signal, `false` for each graceful one
    signals: Vec<bool>,
    alive: bool,
    spawned_with: Option<Vec<String>>,
    output_tx: Option<mpsc::UnboundedSender<OutputChunk>>,
    exit_tx: Option<oneshot::Sender<MonitorResult<ExitOutcome>>>,
}

impl FakeState {
    fn exit_with(&mut self, outcome: MonitorResult<ExitOutcome>) {
        self.alive = false;
        self.output_tx = None;
        if let Some(tx) = self.exit_tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

#[derive(Clone)]
pub struct FakeRunner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRunner {
    pub fn new(response: SignalResponse) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                response,
                signals: Vec::new(),
                alive: false,
                spawned_with: None,
                output_tx: None,
                exit_tx: None,
            })),
        }
    }

    pub fn spawner(&self) -> Arc<dyn ProcessSpawner> {
        Arc::new(FakeSpawner { runner: self.clone() })
    }

    pub fn stdout(&self, text: impl Into<String>) {
        self.send(OutputChunk::stdout(text));
    }

    pub fn stderr(&self, text: impl Into<String>) {
        self.send(OutputChunk::stderr(text));
    }

    fn send(&self, chunk: OutputChunk) {
        let state = self.state.lock().unwrap();
        let tx = state.output_tx.as_ref().expect("runner output is closed");
        tx.send(chunk).unwrap();
    }

    pub fn exit(&self, code: i32) {
        self.state.lock().unwrap().exit_with(Ok(ExitOutcome::with_code(code)));
    }

    /// Make waiting on the process fail at the OS level
    pub fn fail(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .exit_with(Err(MonitorError::process(message)));
    }

    pub fn signals(&self) -> Vec<bool> {
        self.state.lock().unwrap().signals.clone()
    }

    pub fn spawned_with(&self) -> Option<Vec<String>> {
        self.state.lock().unwrap().spawned_with.clone()
    }
}

struct FakeSpawner {
    runner: FakeRunner,
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, command: &[String]) -> MonitorResult<SpawnedProcess> {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        {
            let mut state = self.runner.state.lock().unwrap();
            state.alive = true;
            state.spawned_with = Some(command.to_vec());
            state.output_tx = Some(output_tx);
            state.exit_tx = Some(exit_tx);
        }

        Ok(SpawnedProcess {
            process: Box::new(FakeProcess {
                runner: self.runner.clone(),
            }),
            exit: exit_rx,
            output: output_rx,
        })
    }
}

struct FakeProcess {
    runner: FakeRunner,
}

impl Process for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(TestFixtures::RUNNER_PID)
    }

    fn is_alive(&self) -> bool {
        self.runner.state.lock().unwrap().alive
    }

    fn terminate(&self, escalate: bool) -> MonitorResult<()> {
        let mut state = self.runner.state.lock().unwrap();
        state.signals.push(escalate);
        match (state.response, escalate) {
            (SignalResponse::ExitOnTerm, false) => state.exit_with(Ok(ExitOutcome::with_signal(SIGTERM))),
            (SignalResponse::ExitOnTerm | SignalResponse::ExitOnKill, true) => {
                state.exit_with(Ok(ExitOutcome::with_signal(SIGKILL)))
            }
            _ => {}
        }
        Ok(())
    }
}

/// A monitor wired to a fake runner and a fixed memory reading
pub struct MonitorHarness {
    pub monitor: Arc<TestMonitor>,
    pub runner: FakeRunner,
    pub events: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl MonitorHarness {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_options(config, SignalResponse::ExitOnTerm, TestFixtures::LOW_MEMORY)
    }

    pub fn with_options(config: MonitorConfig, response: SignalResponse, resident_bytes: u64) -> Self {
        let mut probe = MockMemoryProbe::new();
        probe
            .expect_sample()
            .returning(move |pid| MemorySnapshot::new(pid.unwrap_or(1), resident_bytes, resident_bytes * 2));

        let runner = FakeRunner::new(response);
        let monitor = Arc::new(TestMonitor::with_services(config, runner.spawner(), Arc::new(probe)));
        let events = monitor.subscribe();
        Self { monitor, runner, events }
    }

    /// Start monitoring in the background and let the run loop come up
    pub async fn start(&self) -> JoinHandle<MonitorResult<bool>> {
        let monitor = self.monitor.clone();
        let handle = tokio::spawn(async move { monitor.start_monitoring(TestFixtures::command()).await });
        settle().await;
        handle
    }

    pub fn take_events(&mut self) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn event_names(&mut self) -> Vec<&'static str> {
        self.take_events().iter().map(MonitorEvent::name).collect()
    }
}

/// Let spawned tasks process everything already sent to them
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Move paused time forward
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}
