//! Integration tests for the test monitor
//!
//! These drive a full `TestMonitor` run against a fake runner with paused
//! time, so timer-driven behaviour is deterministic.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

use monitor::traits::{MockMemoryProbe, MockProcessSpawner};
use monitor::{MonitorConfig, MonitorError, TestMonitor};
use shared::{HangingSignal, MemorySnapshot, MonitorEvent, TestOutcome, TestStatus};

mod common;
use common::{advance, settle, MonitorHarness, SignalResponse, TestFixtures};

/// A clean run: start and completion markers, exit code 0
#[tokio::test(start_paused = true)]
async fn test_passing_run_reports_lifecycle_and_succeeds() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    harness.runner.stdout(TestFixtures::pass_line(TestFixtures::FIRST, 12));
    settle().await;
    harness.runner.exit(0);

    assert!(run.await.unwrap().unwrap());
    assert_eq!(harness.runner.spawned_with(), Some(TestFixtures::command()));

    let events = harness.take_events();
    assert_eq!(events.len(), 2);
    let MonitorEvent::TestCompleted(entry) = &events[1] else {
        panic!("expected testCompleted, got {:?}", events[1]);
    };
    assert_eq!(entry.status, TestStatus::Completed);
    assert_eq!(entry.duration, Duration::from_millis(12));
    assert_eq!(entry.outcome, Some(TestOutcome::Passed));

    assert_eq!(harness.monitor.get_execution_status().active_tests, 0);
    assert!(harness.runner.signals().is_empty());
}

/// A test silent past the hanging threshold is reported exactly once
#[tokio::test(start_paused = true)]
async fn test_silent_test_reported_hanging_once() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    advance(Duration::from_secs(9)).await;

    assert_eq!(
        harness.event_names(),
        vec!["testStarted", "testHanging", "hangingTestsDetected"]
    );
    let status = harness.monitor.get_execution_status();
    assert_eq!(status.active_tests, 1);
    assert_eq!(status.hanging_tests, 1);

    // A late completion still resolves the hanging entry
    harness.runner.stdout(TestFixtures::pass_line(TestFixtures::FIRST, 9000));
    settle().await;
    assert_eq!(harness.event_names(), vec!["testCompleted", "slowTest"]);
    assert_eq!(harness.monitor.get_execution_status().active_tests, 0);

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

/// With the kill switch on, one runaway test ends the whole run
#[tokio::test(start_paused = true)]
async fn test_runaway_test_kills_run() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    settle().await;

    let result = run.await.unwrap().unwrap();
    assert!(!result);
    assert_eq!(harness.runner.signals(), vec![false]);

    let events = harness.take_events();
    let killed = events
        .iter()
        .find_map(|e| match e {
            MonitorEvent::TestKilled(entry) => Some(entry.clone()),
            _ => None,
        })
        .expect("testKilled should be published");
    assert_eq!(killed.test_name, TestFixtures::FIRST);
    assert_eq!(killed.status, TestStatus::Killed);
    assert_eq!(harness.monitor.get_execution_status().active_tests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_kill_switch_disabled_lets_run_continue() {
    let config = MonitorConfig::default().with_kill_switch(false);
    let mut harness = MonitorHarness::new(config);
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    advance(Duration::from_secs(15)).await;

    assert!(harness.runner.signals().is_empty());
    assert!(!harness.event_names().contains(&"testKilled"));

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

/// The suite budget bounds the run even without any test output
#[tokio::test(start_paused = true)]
async fn test_suite_timeout_terminates_runner() {
    let harness = MonitorHarness::new(MonitorConfig::default());
    let started = Instant::now();
    let run = harness.start().await;

    let result = run.await.unwrap().unwrap();

    assert!(!result);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(harness.runner.signals(), vec![false]);
}

#[tokio::test(start_paused = true)]
async fn test_high_memory_reported_on_sample_interval() {
    let mut harness = MonitorHarness::with_options(
        MonitorConfig::default(),
        SignalResponse::ExitOnTerm,
        TestFixtures::HIGH_MEMORY,
    );
    let run = harness.start().await;

    advance(Duration::from_millis(4900)).await;
    assert!(harness.event_names().is_empty());

    advance(Duration::from_millis(200)).await;
    let events = harness.take_events();
    assert_eq!(events.len(), 1);
    let MonitorEvent::HighMemoryUsage(snapshot) = &events[0] else {
        panic!("expected highMemoryUsage, got {:?}", events[0]);
    };
    assert_eq!(snapshot.pid, TestFixtures::RUNNER_PID);
    assert_eq!(snapshot.resident_bytes, TestFixtures::HIGH_MEMORY);

    // Stateless: the next sample reports again
    advance(Duration::from_secs(5)).await;
    assert_eq!(harness.event_names(), vec!["highMemoryUsage"]);

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_failing_test_completes_entry() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    harness.runner.stdout(TestFixtures::fail_line(TestFixtures::FIRST, 40));
    settle().await;
    harness.runner.exit(1);

    assert!(!run.await.unwrap().unwrap());
    let events = harness.take_events();
    let MonitorEvent::TestCompleted(entry) = &events[1] else {
        panic!("expected testCompleted, got {:?}", events[1]);
    };
    assert_eq!(entry.outcome, Some(TestOutcome::Failed));
    assert_eq!(harness.monitor.get_execution_status().active_tests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_marker_split_across_chunks() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout("❯ src/math.test.ts ad");
    settle().await;
    assert!(harness.event_names().is_empty());

    harness.runner.stdout("ds numbers\r\n");
    settle().await;
    assert_eq!(harness.event_names(), vec!["testStarted"]);

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_unterminated_last_line_is_flushed_on_exit() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    harness.runner.stdout("✓ adds numbers 5ms");
    settle().await;
    harness.runner.exit(0);

    assert!(run.await.unwrap().unwrap());
    assert_eq!(harness.event_names(), vec!["testStarted", "testCompleted"]);
}

#[tokio::test(start_paused = true)]
async fn test_stderr_and_queued_lines_publish_without_registry_changes() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stderr("Error: Test timed out in 5000ms. TIMEOUT\n");
    harness.runner.stdout(" ↓ src/slow.test.ts [queued]\n");
    settle().await;

    let events = harness.take_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().any(|e| matches!(e, MonitorEvent::TestHanging(HangingSignal::Stderr(_)))));
    assert!(events.iter().any(|e| matches!(e, MonitorEvent::TestQueued(_))));
    assert_eq!(harness.monitor.get_execution_status().active_tests, 0);

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

/// Completion matches the first entry in key order, even for a looser name
#[tokio::test(start_paused = true)]
async fn test_completion_matches_by_name_containment() {
    let mut harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    harness.runner.stdout(TestFixtures::start_line(TestFixtures::SECOND));
    harness.runner.stdout(TestFixtures::pass_line("numbers", 3));
    settle().await;

    let completed: Vec<String> = harness
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            MonitorEvent::TestCompleted(entry) => Some(entry.test_name),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![TestFixtures::FIRST.to_string()]);

    let status = harness.monitor.get_execution_status();
    assert_eq!(status.active_tests, 1);

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_stop_terminates_once_and_clears_registry() {
    let mut harness = MonitorHarness::with_options(
        MonitorConfig::default(),
        SignalResponse::ExitOnKill,
        TestFixtures::HIGH_MEMORY,
    );
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    settle().await;
    harness.take_events();

    harness.monitor.stop();
    harness.monitor.stop();
    assert_eq!(harness.monitor.get_execution_status().active_tests, 0);
    settle().await;
    assert_eq!(harness.runner.signals(), vec![false]);

    // Runner ignores the graceful signal; escalation still runs, timers do not
    let result = run.await.unwrap().unwrap();
    assert!(!result);
    assert_eq!(harness.runner.signals(), vec![false, true]);
    assert!(harness.event_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_escalates_to_forceful_signal_after_grace_period() {
    let harness = MonitorHarness::with_options(
        TestFixtures::short_suite_config(),
        SignalResponse::ExitOnKill,
        TestFixtures::LOW_MEMORY,
    );
    let started = Instant::now();
    let run = harness.start().await;

    advance(Duration::from_millis(1500)).await;
    assert_eq!(harness.runner.signals(), vec![false]);

    let result = run.await.unwrap().unwrap();
    assert!(!result);
    assert_eq!(harness.runner.signals(), vec![false, true]);
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_on_unkillable_runner() {
    let harness = MonitorHarness::with_options(
        TestFixtures::short_suite_config(),
        SignalResponse::Ignore,
        TestFixtures::LOW_MEMORY,
    );
    let started = Instant::now();
    let run = harness.start().await;

    let result = run.await.unwrap().unwrap();

    assert!(!result);
    assert_eq!(harness.runner.signals(), vec![false, true]);
    assert!(started.elapsed() >= Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_start_is_rejected() {
    let harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    let second = harness.monitor.start_monitoring(TestFixtures::command()).await;
    assert!(matches!(second, Err(MonitorError::AlreadyRunning)));

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

/// Abandoning a run kills the runner and frees the monitor for the next one
#[tokio::test(start_paused = true)]
async fn test_dropped_run_releases_monitor() {
    let harness = MonitorHarness::new(MonitorConfig::default());

    let abandoned = timeout(
        Duration::from_millis(10),
        harness.monitor.start_monitoring(TestFixtures::command()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(harness.runner.signals(), vec![true]);

    let run = harness.start().await;
    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_non_zero_exit_fails_run() {
    let harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.exit(3);

    assert!(!run.await.unwrap().unwrap());
    assert!(harness.runner.signals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_failure_is_returned_as_error() {
    let harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.fail("wait failed");

    let result = run.await.unwrap();
    assert!(matches!(result, Err(MonitorError::ProcessError { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_status_reports_active_run() {
    let harness = MonitorHarness::new(MonitorConfig::default());
    let run = harness.start().await;

    harness.runner.stdout(TestFixtures::start_line(TestFixtures::FIRST));
    advance(Duration::from_secs(1)).await;

    let status = harness.monitor.get_execution_status();
    assert!(status.run_id.is_some());
    assert!(status.elapsed >= Duration::from_secs(1));
    assert_eq!(status.active_tests, 1);
    assert_eq!(status.hanging_tests, 0);
    assert_eq!(status.memory.pid, TestFixtures::RUNNER_PID);

    harness.runner.exit(0);
    assert!(run.await.unwrap().unwrap());

    // Elapsed is frozen once the run ends
    let finished = harness.monitor.get_execution_status().elapsed;
    advance(Duration::from_secs(5)).await;
    assert_eq!(harness.monitor.get_execution_status().elapsed, finished);
}

#[tokio::test]
async fn test_spawn_failure_propagates() {
    let mut spawner = MockProcessSpawner::new();
    spawner.expect_spawn().times(1).returning(|command| {
        Err(MonitorError::SpawnFailed {
            program: command[0].clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        })
    });
    let mut probe = MockMemoryProbe::new();
    probe.expect_sample().returning(|_| MemorySnapshot::default());

    let monitor = TestMonitor::with_services(MonitorConfig::default(), Arc::new(spawner), Arc::new(probe));
    let result = monitor.start_monitoring(TestFixtures::command()).await;

    assert!(matches!(result, Err(MonitorError::SpawnFailed { ref program, .. }) if program == "npx"));
}
