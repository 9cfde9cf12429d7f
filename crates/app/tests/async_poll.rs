//! Async poll runs and cancellation.

use std::sync::Arc;
use std::time::Duration;
use telemetry_probe_app::{PollDeps, min_points, never, poll_until_async};
use telemetry_probe_config::PollerSettings;
use telemetry_probe_domain::{DataPoint, PollStatus};
use telemetry_probe_ports::SharedSnapshotSource;
use telemetry_probe_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use telemetry_probe_testkit::fixtures::rpc_count_script;
use telemetry_probe_testkit::{
    InMemoryMetricReader, RecordingLogger, ScriptedSnapshotSource, Temporality,
};

#[tokio::test]
async fn cancel_during_sleep_keeps_completed_polls() -> Result<()> {
    let (script, dp1, _) = rpc_count_script();
    let source: SharedSnapshotSource = Arc::new(ScriptedSnapshotSource::new(script));
    let settings = PollerSettings::new(5, Duration::from_secs(60))?;
    let ctx = RequestContext::new_request();

    let canceller = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.cancel();
        })
    };

    let failure = poll_until_async(&ctx, source, never(), &settings, &PollDeps::new())
        .await
        .err()
        .ok_or_else(|| ErrorEnvelope::invariant(ErrorCode::internal(), "expected a failure"))?;
    canceller
        .await
        .map_err(|error| ErrorEnvelope::invariant(ErrorCode::internal(), error.to_string()))?;

    assert!(failure.is_cancelled());
    assert_eq!(failure.polls(), 1);
    assert_eq!(failure.partial().points("rpc.count"), &[dp1]);
    Ok(())
}

#[tokio::test]
async fn async_run_reads_in_memory_reader() -> Result<()> {
    let reader = Arc::new(InMemoryMetricReader::new(Temporality::Delta).with_publish_delay(2));
    reader.record("rpc.count", DataPoint::counter(1))?;
    reader.record("rpc.count", DataPoint::counter(2))?;
    let logger = Arc::new(RecordingLogger::new());
    let ctx = RequestContext::new_request();

    let report = poll_until_async(
        &ctx,
        reader.clone(),
        min_points("rpc.count", 2),
        &PollerSettings::new(5, Duration::from_millis(1))?,
        &PollDeps::new().with_logger(logger.clone()),
    )
    .await?;

    assert_eq!(report.status(), PollStatus::Converged);
    assert_eq!(report.polls(), 2);
    assert_eq!(
        logger.field("probe.poll.start", "correlation_id"),
        Some(serde_json::Value::from(ctx.correlation_id().as_str()))
    );
    Ok(())
}
