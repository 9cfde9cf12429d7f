//! End-to-end poll runs against scripted and in-memory sources.

use std::sync::Arc;
use std::time::Duration;
use telemetry_probe_app::{PollDeps, has_instruments, min_points, never, poll_until};
use telemetry_probe_config::PollerSettings;
use telemetry_probe_domain::{DataPoint, MergePolicy, PollStatus};
use telemetry_probe_ports::LogLevel;
use telemetry_probe_shared::{ErrorCode, ErrorEnvelope, Result};
use telemetry_probe_testkit::fixtures::{counter_point, rpc_count_script, snapshot_of};
use telemetry_probe_testkit::{
    InMemoryMetricReader, RecordingLogger, RecordingTelemetry, ScriptedSnapshotSource, Temporality,
};

fn settings(max_iterations: u32, interval_ms: u64) -> Result<PollerSettings> {
    Ok(PollerSettings::new(
        max_iterations,
        Duration::from_millis(interval_ms),
    )?)
}

#[test]
fn append_keeps_the_repeated_point() -> Result<()> {
    let (script, dp1, dp2) = rpc_count_script();
    let source = ScriptedSnapshotSource::new(script);

    let report = poll_until(
        &source,
        &min_points("rpc.count", 2),
        &settings(5, 10)?,
        &PollDeps::new(),
    )?;

    assert_eq!(report.status(), PollStatus::Converged);
    assert_eq!(report.polls(), 2);
    assert_eq!(source.flush_calls(), 2);
    assert_eq!(source.collect_calls(), 2);
    assert_eq!(report.result().points("rpc.count"), &[dp1.clone(), dp1, dp2]);
    Ok(())
}

#[test]
fn replace_keeps_only_the_latest_snapshot() -> Result<()> {
    let (script, dp1, dp2) = rpc_count_script();
    let source = ScriptedSnapshotSource::new(script);
    let settings = settings(5, 10)?.with_merge_policy(MergePolicy::Replace);

    let report = poll_until(
        &source,
        &min_points("rpc.count", 2),
        &settings,
        &PollDeps::new(),
    )?;

    assert_eq!(report.status(), PollStatus::Converged);
    assert_eq!(report.polls(), 2);
    assert_eq!(report.result().points("rpc.count"), &[dp1, dp2]);
    Ok(())
}

#[test]
fn never_converging_uses_exactly_the_budget() -> Result<()> {
    let source = ScriptedSnapshotSource::new([snapshot_of("rpc.count", [counter_point(1, 1)])]);
    let telemetry = Arc::new(RecordingTelemetry::new());
    let deps = PollDeps::new().with_telemetry(telemetry.clone());

    let report = poll_until(&source, &never(), &settings(4, 1)?, &deps)?;

    assert_eq!(report.status(), PollStatus::Exhausted);
    assert_eq!(report.polls(), 4);
    assert_eq!(source.collect_calls(), 4);
    assert_eq!(report.result().point_count("rpc.count"), 4);
    assert_eq!(telemetry.counter("probe.poll.cycles"), 4);
    assert_eq!(telemetry.counter("probe.poll.exhausted"), 1);
    assert_eq!(telemetry.counter("probe.poll.converged"), 0);
    assert_eq!(telemetry.timers("probe.poll.total").len(), 1);
    Ok(())
}

#[test]
fn flush_deadline_comes_from_settings() -> Result<()> {
    let source = ScriptedSnapshotSource::empty();
    let settings = settings(2, 1)?.with_flush_timeout(Duration::from_millis(750))?;

    poll_until(&source, &never(), &settings, &PollDeps::new())?;

    assert_eq!(
        source.flush_deadlines(),
        vec![Duration::from_millis(750), Duration::from_millis(750)]
    );
    Ok(())
}

#[test]
fn instrument_allow_list_hides_other_instruments() -> Result<()> {
    let source = ScriptedSnapshotSource::new([snapshot_of("rpc.count", [counter_point(1, 1)])
        .with_points(
            telemetry_probe_testkit::fixtures::instrument("rpc.latency"),
            [counter_point(9, 9)],
        )]);
    let settings = settings(3, 1)?.with_instruments(["rpc.latency"])?;

    let report = poll_until(
        &source,
        &has_instruments(["rpc.count"]),
        &settings,
        &PollDeps::new(),
    )?;

    assert_eq!(report.status(), PollStatus::Exhausted);
    assert!(!report.result().contains("rpc.count"));
    assert_eq!(report.result().point_count("rpc.latency"), 3);
    Ok(())
}

#[test]
fn run_logs_start_cycles_and_outcome() -> Result<()> {
    let (script, _, _) = rpc_count_script();
    let source = ScriptedSnapshotSource::new(script).incomplete_flush_at(1);
    let logger = Arc::new(RecordingLogger::new());
    let deps = PollDeps::new().with_logger(logger.clone());

    poll_until(&source, &min_points("rpc.count", 2), &settings(5, 1)?, &deps)?;

    assert_eq!(
        logger.event_names(),
        vec![
            "probe.poll.start".to_string(),
            "probe.poll.flush_incomplete".to_string(),
            "probe.poll.cycle".to_string(),
            "probe.poll.cycle".to_string(),
            "probe.poll.converged".to_string(),
        ]
    );
    assert_eq!(logger.events_at(LogLevel::Warn).len(), 1);
    assert_eq!(
        logger.field("probe.poll.start", "source"),
        Some(serde_json::Value::from("scripted"))
    );
    assert_eq!(
        logger.field("probe.poll.start", "run_id"),
        logger.field("probe.poll.converged", "run_id")
    );
    Ok(())
}

#[test]
fn collect_failure_reports_partial_view_and_logs_error() -> Result<()> {
    let (script, dp1, _) = rpc_count_script();
    let source = ScriptedSnapshotSource::new(script).fail_collect_at(2);
    let logger = Arc::new(RecordingLogger::new());
    let telemetry = Arc::new(RecordingTelemetry::new());
    let deps = PollDeps::new()
        .with_logger(logger.clone())
        .with_telemetry(telemetry.clone());

    let failure = poll_until(&source, &never(), &settings(5, 1)?, &deps)
        .err()
        .ok_or_else(|| ErrorEnvelope::invariant(ErrorCode::internal(), "expected a failure"))?;

    assert_eq!(failure.error().code, ErrorCode::collect_failed());
    assert_eq!(failure.polls(), 1);
    assert_eq!(failure.partial().points("rpc.count"), &[dp1]);
    assert_eq!(logger.events_at(LogLevel::Error).len(), 1);
    assert_eq!(telemetry.counter("probe.poll.failed"), 1);

    let envelope: ErrorEnvelope = failure.into();
    assert_eq!(
        envelope.metadata.get("polls_completed").map(String::as_str),
        Some("1")
    );
    Ok(())
}

#[test]
fn delayed_reader_converges_once_points_publish() -> Result<()> {
    let reader = InMemoryMetricReader::new(Temporality::Delta).with_publish_delay(3);
    reader.record("rpc.count", DataPoint::counter(1))?;
    reader.record("rpc.count", DataPoint::counter(2))?;

    let report = poll_until(
        &reader,
        &min_points("rpc.count", 2),
        &settings(10, 1)?,
        &PollDeps::new(),
    )?;

    assert_eq!(report.status(), PollStatus::Converged);
    assert_eq!(report.polls(), 3);
    assert_eq!(reader.pending_count(), 0);
    Ok(())
}

#[test]
fn cumulative_reader_needs_replace_to_avoid_duplicates() -> Result<()> {
    let reader = InMemoryMetricReader::new(Temporality::Cumulative);
    reader.record("rpc.count", DataPoint::counter(1))?;

    let append = poll_until(&reader, &never(), &settings(3, 1)?, &PollDeps::new())?;
    let replace = poll_until(
        &reader,
        &never(),
        &settings(3, 1)?.with_merge_policy(MergePolicy::Replace),
        &PollDeps::new(),
    )?;

    assert_eq!(append.result().point_count("rpc.count"), 3);
    assert_eq!(replace.result().point_count("rpc.count"), 1);
    Ok(())
}
