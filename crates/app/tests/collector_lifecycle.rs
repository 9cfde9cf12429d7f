//! Background collector runs: stop, failure, panic.

use std::sync::Arc;
use std::time::Duration;
use telemetry_probe_app::{CollectorState, MetricsCollector, PollDeps, never};
use telemetry_probe_config::CollectorSettings;
use telemetry_probe_domain::PollStatus;
use telemetry_probe_shared::{ErrorCode, ErrorEnvelope, Result};
use telemetry_probe_testkit::fixtures::rpc_count_script;
use telemetry_probe_testkit::{RecordingLogger, RecordingTelemetry, ScriptedSnapshotSource};

fn wait_until(mut done: impl FnMut() -> bool) {
    while !done() {
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn expect_failure(
    result: telemetry_probe_app::PollResult,
) -> Result<telemetry_probe_domain::PollFailure> {
    result
        .err()
        .ok_or_else(|| ErrorEnvelope::invariant(ErrorCode::internal(), "expected a failure"))
}

#[test]
fn stop_mid_run_returns_everything_accumulated() -> Result<()> {
    let (script, _, _) = rpc_count_script();
    let source = Arc::new(ScriptedSnapshotSource::new(script));
    let logger = Arc::new(RecordingLogger::new());
    let telemetry = Arc::new(RecordingTelemetry::new());
    let collector = MetricsCollector::start(
        source.clone(),
        never(),
        CollectorSettings::new(10_000, Duration::from_millis(2))?,
        PollDeps::new()
            .with_logger(logger.clone())
            .with_telemetry(telemetry.clone()),
    )?;

    wait_until(|| source.collect_calls() >= 3);
    let report = collector.stop()?;

    assert_eq!(report.status(), PollStatus::Stopped);
    assert!(report.polls() >= 3);
    // First poll adds one point, every later poll adds two.
    let expected = usize::try_from(report.polls() * 2 - 1).unwrap_or_default();
    assert_eq!(report.result().point_count("rpc.count"), expected);
    assert_eq!(logger.events_named("probe.collector.started").len(), 1);
    assert_eq!(logger.events_named("probe.collector.stopped").len(), 1);
    assert_eq!(telemetry.counter("probe.poll.stopped"), 1);
    Ok(())
}

#[test]
fn source_failure_ends_worker_with_partial_view() -> Result<()> {
    let (script, dp1, _) = rpc_count_script();
    let source = Arc::new(ScriptedSnapshotSource::new(script).fail_collect_at(2));
    let collector = MetricsCollector::start(
        source.clone(),
        never(),
        CollectorSettings::new(10, Duration::from_millis(1))?,
        PollDeps::new(),
    )?;

    wait_until(|| collector.is_finished());
    assert_eq!(collector.state(), CollectorState::Stopped);
    let failure = expect_failure(collector.stop())?;

    assert_eq!(failure.error().code, ErrorCode::collect_failed());
    assert_eq!(failure.polls(), 1);
    assert_eq!(failure.partial().points("rpc.count"), &[dp1]);
    Ok(())
}

#[test]
fn source_panic_keeps_the_partial_view() -> Result<()> {
    let (script, dp1, dp2) = rpc_count_script();
    let source = Arc::new(ScriptedSnapshotSource::new(script).panic_on_collect_at(3));
    let logger = Arc::new(RecordingLogger::new());
    let collector = MetricsCollector::start(
        source.clone(),
        never(),
        CollectorSettings::new(10, Duration::from_millis(1))?,
        PollDeps::new().with_logger(logger.clone()),
    )?;

    wait_until(|| collector.is_finished());
    assert_eq!(collector.state(), CollectorState::Stopped);
    let failure = expect_failure(collector.stop())?;

    assert_eq!(failure.error().code, ErrorCode::worker_panicked());
    assert!(failure.error().message.contains("scripted collect panic on call 3"));
    assert_eq!(
        failure.error().metadata.get("poll").map(String::as_str),
        Some("3")
    );
    assert_eq!(failure.polls(), 2);
    assert_eq!(failure.partial().points("rpc.count"), &[dp1.clone(), dp1, dp2]);
    assert_eq!(logger.events_named("probe.poll.failed").len(), 1);
    Ok(())
}

#[test]
fn dropping_a_running_collector_records_the_run() -> Result<()> {
    let (script, _, _) = rpc_count_script();
    let source = Arc::new(ScriptedSnapshotSource::new(script));
    let telemetry = Arc::new(RecordingTelemetry::new());
    let collector = MetricsCollector::start(
        source.clone(),
        never(),
        CollectorSettings::new(10_000, Duration::from_millis(2))?,
        PollDeps::new().with_telemetry(telemetry.clone()),
    )?;

    wait_until(|| source.collect_calls() >= 2);
    drop(collector);

    assert_eq!(telemetry.counter("probe.poll.stopped"), 1);
    assert_eq!(telemetry.timers("probe.poll.total").len(), 1);
    assert_eq!(Arc::strong_count(&source), 1);
    Ok(())
}

#[test]
fn convergence_without_early_stop_runs_full_budget() -> Result<()> {
    let (script, _, _) = rpc_count_script();
    let source = Arc::new(ScriptedSnapshotSource::new(script));
    let collector = MetricsCollector::start(
        source.clone(),
        telemetry_probe_app::min_points("rpc.count", 2),
        CollectorSettings::new(4, Duration::from_millis(1))?,
        PollDeps::new(),
    )?;

    wait_until(|| collector.is_finished());
    let report = collector.stop()?;

    assert_eq!(report.status(), PollStatus::Converged);
    assert_eq!(report.polls(), 4);
    assert_eq!(source.collect_calls(), 4);
    Ok(())
}
