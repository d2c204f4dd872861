//! Main entry point for the test-monitor binary
//!
//! Runs the given test command under supervision and reports its lifecycle
//! events, either as log lines or as JSON lines on stdout.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;

use monitor::{MonitorConfig, MonitorResult, TestMonitor};
use shared::{logging, process_debug, process_info, process_warn, MonitorEvent, ProcessId};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Supervise a test runner and flag hanging or runaway tests
#[derive(Parser, Debug)]
#[command(name = "test-monitor")]
#[command(about = "Runs a test command and watches it for hanging tests, runaway suites and high memory")]
pub struct Args {
    /// Kill the run when a single test exceeds this many milliseconds
    #[arg(long)]
    pub max_test_duration_ms: Option<u64>,

    /// Terminate the runner after this many milliseconds
    #[arg(long)]
    pub max_suite_duration_ms: Option<u64>,

    /// Report a test as hanging after this many milliseconds
    #[arg(long)]
    pub hanging_threshold_ms: Option<u64>,

    /// Report memory usage above this many MiB resident
    #[arg(long)]
    pub memory_threshold_mb: Option<u64>,

    /// Only report over-long tests, never terminate the runner for them
    #[arg(long)]
    pub no_kill_switch: bool,

    /// JSON config file; command line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,

    /// Test command and its arguments
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl Args {
    fn build_config(&self) -> MonitorResult<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)?,
            None => MonitorConfig::default(),
        };

        if let Some(ms) = self.max_test_duration_ms {
            config = config.with_max_test_duration(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_suite_duration_ms {
            config = config.with_max_suite_duration(Duration::from_millis(ms));
        }
        if let Some(ms) = self.hanging_threshold_ms {
            config = config.with_hanging_test_threshold(Duration::from_millis(ms));
        }
        if let Some(mb) = self.memory_threshold_mb {
            config = config.with_memory_threshold(mb.saturating_mul(BYTES_PER_MB));
        }
        if self.no_kill_switch {
            config = config.with_kill_switch(false);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    ProcessId::init_monitor();
    logging::init_tracing_with_level(Some(&args.log_level));

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            logging::log_error(ProcessId::current(), "Test monitor", &e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> MonitorResult<bool> {
    let config = args.build_config()?;
    logging::log_startup(ProcessId::current(), &args.command.join(" "));
    process_debug!(ProcessId::current(), "Monitor config: {:?}", config);

    let monitor = Arc::new(TestMonitor::new(config));
    let printer = tokio::spawn(print_events(monitor.subscribe(), args.json));

    // Ctrl+C stops the run; the handler must not keep the monitor alive
    let weak = Arc::downgrade(&monitor);
    let ctrl_c = tokio::spawn(async move {
        loop {
            match signal::ctrl_c().await {
                Ok(()) => {
                    logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                    match weak.upgrade() {
                        Some(monitor) => monitor.stop(),
                        None => break,
                    }
                }
                Err(err) => {
                    logging::log_error(ProcessId::current(), "Signal handling", &err);
                    break;
                }
            }
        }
    });

    let result = monitor.start_monitoring(args.command.clone()).await;

    let status = monitor.get_execution_status();
    process_info!(
        ProcessId::current(),
        "📊 Finished after {:?} with {} unfinished test(s)",
        status.elapsed,
        status.active_tests
    );

    ctrl_c.abort();
    // Dropping the last handle closes the event channel so the printer drains and exits
    drop(monitor);
    if let Err(e) = printer.await {
        process_warn!(ProcessId::current(), "⚠️ Event printer ended abnormally: {}", e);
    }

    if let Ok(true) = result {
        logging::log_success(ProcessId::current(), "All tests finished within budget");
    }
    result
}

fn emit_json(event: &MonitorEvent) -> MonitorResult<()> {
    println!("{}", event.to_json()?);
    Ok(())
}

async fn print_events(mut events: mpsc::UnboundedReceiver<MonitorEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            if let Err(e) = emit_json(&event) {
                logging::log_error(ProcessId::current(), "Event serialization", &e);
            }
            continue;
        }

        match &event {
            MonitorEvent::TestStarted(entry) => {
                process_debug!(ProcessId::current(), "▶️ {}", entry.key());
            }
            MonitorEvent::TestCompleted(entry) => {
                process_info!(
                    ProcessId::current(),
                    "{} {} ({:?})",
                    if entry.outcome == Some(shared::TestOutcome::Failed) { "❌" } else { "✅" },
                    entry.key(),
                    entry.duration
                );
            }
            MonitorEvent::SlowTest(entry) => {
                process_warn!(ProcessId::current(), "🐢 Slow test {} took {:?}", entry.key(), entry.duration);
            }
            MonitorEvent::TestQueued(line) => {
                process_debug!(ProcessId::current(), "📥 {}", line);
            }
            MonitorEvent::TestHanging(signal) => {
                process_warn!(ProcessId::current(), "⏳ Possible hang: {:?}", signal);
            }
            MonitorEvent::HangingTestsDetected(entries) => {
                let names: Vec<String> = entries.iter().map(|e| e.key().to_string()).collect();
                process_warn!(ProcessId::current(), "⏳ {} hanging test(s): {}", entries.len(), names.join(", "));
            }
            MonitorEvent::TestKilled(entry) => {
                process_warn!(ProcessId::current(), "💀 Killed run at {}", entry.key());
            }
            MonitorEvent::HighMemoryUsage(snapshot) => {
                process_warn!(
                    ProcessId::current(),
                    "🧠 {:.1} MiB resident (pid {})",
                    snapshot.resident_mib(),
                    snapshot.pid
                );
            }
        }
    }
}
