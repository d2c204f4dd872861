//! Caller-facing test monitor
//!
//! `TestMonitor` runs one test runner at a time. A single `select!` loop per
//! run multiplexes runner output, runner exit, the hang sweep and memory
//! sample intervals, the suite deadline, the termination escalation deadline
//! and the stop signal. `stop` and `get_execution_status` are synchronous so
//! they can be called from any task while `start_monitoring` is awaited.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};

use shared::{
    process_debug, process_error, process_info, process_warn, ExecutionStatus, MonitorEvent, ProcessId, RunId,
    TestStatus,
};

use crate::config::MonitorConfig;
use crate::core::{ActiveTestRegistry, EventChannel, HangDetector, MemoryWatcher, OutputParser, ProcessSupervisor};
use crate::error::{MonitorError, MonitorResult};
use crate::services::{SysinfoMemoryProbe, TokioProcessSpawner};
use crate::traits::{MemoryProbe, ProcessSpawner, SpawnedProcess, Terminate};

/// How long to keep reading output once the runner has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

const SUITE_TIMEOUT_REASON: &str = "suite timeout";
const STOP_REASON: &str = "monitoring stopped";

#[derive(Default)]
struct RunState {
    active: bool,
    run_id: Option<RunId>,
    started: Option<Instant>,
    /// Frozen elapsed time of the last finished run
    finished_after: Option<Duration>,
    pid: Option<u32>,
    /// Taken by the first `stop` call of a run
    stop_tx: Option<mpsc::UnboundedSender<()>>,
}

fn lock_run_state(run: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    run.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks the active run finished when dropped
struct RunSlot<'a> {
    run: &'a Mutex<RunState>,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        let mut run = lock_run_state(self.run);
        run.active = false;
        run.stop_tx = None;
        run.pid = None;
        run.finished_after = run.started.map(|started| started.elapsed());
    }
}

pub struct TestMonitor {
    config: MonitorConfig,
    registry: Arc<ActiveTestRegistry>,
    events: EventChannel,
    spawner: Arc<dyn ProcessSpawner>,
    memory: Arc<dyn MemoryProbe>,
    run: Mutex<RunState>,
}

impl TestMonitor {
    /// Monitor backed by real child processes and `sysinfo` memory sampling
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_services(
            config,
            Arc::new(TokioProcessSpawner::new()),
            Arc::new(SysinfoMemoryProbe::new()),
        )
    }

    pub fn with_services(config: MonitorConfig, spawner: Arc<dyn ProcessSpawner>, memory: Arc<dyn MemoryProbe>) -> Self {
        Self {
            config,
            registry: Arc::new(ActiveTestRegistry::new()),
            events: EventChannel::new(),
            spawner,
            memory,
            run: Mutex::new(RunState::default()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn lock_run(&self) -> MutexGuard<'_, RunState> {
        lock_run_state(&self.run)
    }

    /// Snapshot of the current (or last) run
    pub fn get_execution_status(&self) -> ExecutionStatus {
        let (run_id, elapsed, pid) = {
            let run = self.lock_run();
            let elapsed = match (run.finished_after, run.started) {
                (Some(frozen), _) => frozen,
                (None, Some(started)) => started.elapsed(),
                (None, None) => Duration::ZERO,
            };
            (run.run_id, elapsed, run.pid)
        };

        ExecutionStatus {
            run_id,
            elapsed,
            active_tests: self.registry.len(),
            hanging_tests: self.registry.count_with_status(TestStatus::Hanging),
            memory: self.memory.sample(pid),
        }
    }

    /// Stop the active run, if any. Safe to call repeatedly and before start.
    pub fn stop(&self) {
        let stop_tx = self.lock_run().stop_tx.take();
        self.registry.clear();

        match stop_tx {
            Some(tx) => {
                process_info!(ProcessId::current(), "🛑 Stop requested, terminating test runner");
                let _ = tx.send(());
            }
            None => {
                process_debug!(ProcessId::current(), "Stop requested with no active run");
            }
        }
    }

    /// Run `command` under supervision until it exits or is terminated.
    ///
    /// Resolves `true` only when the runner exited with code 0 and the
    /// monitor never had to terminate it.
    pub async fn start_monitoring(&self, command: Vec<String>) -> MonitorResult<bool> {
        if command.is_empty() {
            return Err(MonitorError::InvalidCommand {
                reason: "command must name an executable".to_string(),
            });
        }
        self.config.validate()?;

        let run_id = RunId::new();
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        {
            let mut run = self.lock_run();
            if run.active {
                return Err(MonitorError::AlreadyRunning);
            }
            *run = RunState {
                active: true,
                run_id: Some(run_id),
                started: Some(Instant::now()),
                finished_after: None,
                pid: None,
                stop_tx: Some(stop_tx),
            };
        }
        // Released on every exit path, including this future being dropped
        let slot = RunSlot { run: &self.run };
        self.registry.clear();

        let result = match self.spawner.spawn(&command) {
            Ok(spawned) => {
                process_info!(
                    ProcessId::current(),
                    "🚀 Monitoring run {}: {}",
                    run_id,
                    command.join(" ")
                );
                self.supervise(spawned, stop_rx).await
            }
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Failed to start test runner: {}", e);
                Err(e)
            }
        };

        drop(slot);
        match &result {
            Ok(true) => process_info!(ProcessId::current(), "✅ Run {} succeeded", run_id),
            Ok(false) => process_warn!(ProcessId::current(), "⚠️ Run {} failed", run_id),
            Err(e) => process_error!(ProcessId::current(), "❌ Run {} aborted: {}", run_id, e),
        }
        result
    }

    async fn supervise(&self, spawned: SpawnedProcess, mut stop_rx: mpsc::UnboundedReceiver<()>) -> MonitorResult<bool> {
        let SpawnedProcess {
            process,
            mut exit,
            mut output,
        } = spawned;
        let pid = process.pid();
        self.lock_run().pid = pid;

        let mut supervisor = ProcessSupervisor::new(process, self.config.kill_grace_period);
        let mut parser = OutputParser::new(
            self.registry.clone(),
            self.events.clone(),
            self.memory.clone(),
            pid,
            self.config.hanging_test_threshold,
        );
        let detector = HangDetector::new(self.registry.clone(), self.events.clone(), &self.config);
        let watcher = MemoryWatcher::new(self.memory.clone(), self.events.clone(), pid, self.config.memory_threshold);

        let started = Instant::now();
        let mut sweep_interval = interval_at(started + self.config.sweep_interval, self.config.sweep_interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut memory_interval = interval_at(
            started + self.config.memory_sample_interval,
            self.config.memory_sample_interval,
        );
        memory_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let suite_deadline = sleep_until(started + self.config.max_suite_duration);
        tokio::pin!(suite_deadline);

        let mut timers_active = true;
        let mut suite_fired = false;
        let mut output_open = true;
        let mut stop_open = true;
        let mut stopped = false;

        let outcome = loop {
            let escalation = supervisor.next_deadline();

            tokio::select! {
                result = &mut exit => {
                    match result {
                        Ok(Ok(outcome)) => break outcome,
                        Ok(Err(e)) => {
                            supervisor.terminate("test runner error");
                            self.registry.clear();
                            return Err(e);
                        }
                        Err(_) => {
                            supervisor.terminate("test runner error");
                            self.registry.clear();
                            return Err(MonitorError::process("exit notification was dropped"));
                        }
                    }
                }
                chunk = output.recv(), if output_open => {
                    match chunk {
                        Some(chunk) if !stopped => parser.feed(&chunk),
                        Some(_) => {}
                        None => output_open = false,
                    }
                }
                _ = sweep_interval.tick(), if timers_active => {
                    detector.sweep(Instant::now(), &mut supervisor);
                }
                _ = memory_interval.tick(), if timers_active => {
                    watcher.sample();
                }
                _ = &mut suite_deadline, if !suite_fired => {
                    suite_fired = true;
                    process_warn!(
                        ProcessId::current(),
                        "⏰ Suite exceeded {:?}, terminating test runner",
                        self.config.max_suite_duration
                    );
                    supervisor.terminate(SUITE_TIMEOUT_REASON);
                }
                _ = sleep_until(escalation.unwrap_or(started)), if escalation.is_some() => {
                    if supervisor.on_deadline() {
                        if !stopped {
                            parser.flush();
                        }
                        return Ok(false);
                    }
                }
                msg = stop_rx.recv(), if stop_open => {
                    stop_open = false;
                    if msg.is_some() {
                        stopped = true;
                        timers_active = false;
                        self.registry.clear();
                        supervisor.terminate(STOP_REASON);
                    }
                }
            }
        };
        supervisor.mark_exited();

        if output_open && !stopped {
            let drain = async {
                while let Some(chunk) = output.recv().await {
                    parser.feed(&chunk);
                }
            };
            if timeout(OUTPUT_DRAIN_TIMEOUT, drain).await.is_err() {
                process_debug!(ProcessId::current(), "Output still open {:?} after exit, giving up on it", OUTPUT_DRAIN_TIMEOUT);
            }
        }
        if stopped {
            self.registry.clear();
        } else {
            parser.flush();
        }

        let reason = supervisor.termination_reason();
        process_debug!(
            ProcessId::current(),
            "Test runner exited (code: {:?}, signal: {:?}, termination: {})",
            outcome.code,
            outcome.signal,
            reason.unwrap_or("none")
        );
        Ok(outcome.success() && reason.is_none())
    }
}
