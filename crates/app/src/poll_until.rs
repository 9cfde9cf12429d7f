//! Poll a snapshot source until a predicate holds or the budget runs out.

use crate::cycle::{PollCycle, PollDeps, RunTracker, duration_to_ms};
use serde_json::Value;
use std::sync::Arc;
use telemetry_probe_config::PollerSettings;
use telemetry_probe_domain::{
    AccumulatedResult, PollFailure, PollOutcome, PollReport, PollStatus, Snapshot,
};
use telemetry_probe_ports::{LogFields, Predicate, SharedSnapshotSource, SnapshotSource};
use telemetry_probe_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, sleep_with_cancellation,
};

/// Outcome of a poll run: a report, or a failure carrying the partial view.
pub type PollResult = std::result::Result<PollReport, PollFailure>;

/// Block the calling thread, polling `source` until `predicate` holds.
///
/// Each cycle flushes, collects, filters, merges, then evaluates the
/// predicate. The thread sleeps `settings.interval()` between cycles but not
/// after the last one. Running out of budget is reported as
/// [`PollStatus::Exhausted`], not as an error.
pub fn poll_until(
    source: &dyn SnapshotSource,
    predicate: &Predicate,
    settings: &PollerSettings,
    deps: &PollDeps,
) -> PollResult {
    let cycle = PollCycle::for_poller(settings, deps);
    let tracker = RunTracker::start(&cycle, "sync", start_fields(source, settings));
    let result = run_blocking(source, predicate, settings, &cycle);
    tracker.finish(&cycle, result)
}

fn run_blocking(
    source: &dyn SnapshotSource,
    predicate: &Predicate,
    settings: &PollerSettings,
    cycle: &PollCycle,
) -> PollResult {
    let budget = settings.max_iterations();
    let mut accumulated = AccumulatedResult::new();

    for poll in 1..=budget {
        let snapshot = match cycle.observe(source, poll) {
            Ok(snapshot) => snapshot,
            Err(error) => return Err(PollFailure::new(error, poll - 1, accumulated)),
        };
        let converged = cycle.absorb(&mut accumulated, snapshot, predicate, poll);

        match PollOutcome::decide(converged, poll, budget) {
            PollOutcome::Converged => {
                return Ok(PollReport::new(PollStatus::Converged, poll, accumulated));
            },
            PollOutcome::ExhaustedBudget => {
                return Ok(PollReport::new(PollStatus::Exhausted, poll, accumulated));
            },
            PollOutcome::ContinuePolling => std::thread::sleep(settings.interval()),
        }
    }

    // Validated settings never carry a zero budget.
    Ok(PollReport::new(PollStatus::Exhausted, budget, accumulated))
}

/// Async form of [`poll_until`] for tokio callers.
///
/// The source is called on the blocking pool so a slow flush never stalls
/// the runtime. Sleeps between cycles end early when `ctx` is cancelled; the
/// run then fails with a cancellation error and the partial view.
pub async fn poll_until_async(
    ctx: &RequestContext,
    source: SharedSnapshotSource,
    predicate: Predicate,
    settings: &PollerSettings,
    deps: &PollDeps,
) -> PollResult {
    let cycle = Arc::new(PollCycle::for_poller(settings, deps));
    let mut fields = start_fields(source.as_ref(), settings);
    fields.insert(
        "correlation_id".into(),
        Value::from(ctx.correlation_id().as_str()),
    );
    let tracker = RunTracker::start(&cycle, "async", fields);
    let result = run_async(ctx, source, &predicate, settings, &cycle).await;
    tracker.finish(&cycle, result)
}

async fn run_async(
    ctx: &RequestContext,
    source: SharedSnapshotSource,
    predicate: &Predicate,
    settings: &PollerSettings,
    cycle: &Arc<PollCycle>,
) -> PollResult {
    let budget = settings.max_iterations();
    let mut accumulated = AccumulatedResult::new();

    for poll in 1..=budget {
        if let Err(error) = ctx.ensure_not_cancelled("poll_until.cycle") {
            return Err(PollFailure::new(error, poll - 1, accumulated));
        }
        let snapshot = match observe_on_blocking_pool(&source, cycle, poll).await {
            Ok(snapshot) => snapshot,
            Err(error) => return Err(PollFailure::new(error, poll - 1, accumulated)),
        };
        let converged = cycle.absorb(&mut accumulated, snapshot, predicate, poll);

        match PollOutcome::decide(converged, poll, budget) {
            PollOutcome::Converged => {
                return Ok(PollReport::new(PollStatus::Converged, poll, accumulated));
            },
            PollOutcome::ExhaustedBudget => {
                return Ok(PollReport::new(PollStatus::Exhausted, poll, accumulated));
            },
            PollOutcome::ContinuePolling => {
                if let Err(error) =
                    sleep_with_cancellation(ctx, settings.interval(), "poll_until.sleep").await
                {
                    return Err(PollFailure::new(error, poll, accumulated));
                }
            },
        }
    }

    Ok(PollReport::new(PollStatus::Exhausted, budget, accumulated))
}

async fn observe_on_blocking_pool(
    source: &SharedSnapshotSource,
    cycle: &Arc<PollCycle>,
    poll: u32,
) -> Result<Snapshot> {
    let source = Arc::clone(source);
    let cycle = Arc::clone(cycle);
    tokio::task::spawn_blocking(move || cycle.observe(source.as_ref(), poll))
        .await
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::worker_panicked(),
                format!("snapshot task failed: {error}"),
                ErrorClass::NonRetriable,
            )
            .with_metadata("poll", poll.to_string())
        })?
}

fn start_fields(source: &dyn SnapshotSource, settings: &PollerSettings) -> LogFields {
    let mut fields = LogFields::new();
    fields.insert("source".into(), Value::from(source.name()));
    fields.insert(
        "max_iterations".into(),
        Value::from(settings.max_iterations()),
    );
    fields.insert(
        "interval_ms".into(),
        Value::from(duration_to_ms(settings.interval())),
    );
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::{min_points, never};
    use std::time::Duration;
    use telemetry_probe_testkit::fixtures::rpc_count_script;
    use telemetry_probe_testkit::{RecordingLogger, ScriptedSnapshotSource};

    fn settings(max_iterations: u32) -> Result<PollerSettings> {
        Ok(PollerSettings::new(max_iterations, Duration::from_millis(1))?)
    }

    #[test]
    fn converges_after_exact_number_of_polls() -> Result<()> {
        let (script, dp1, dp2) = rpc_count_script();
        let source = ScriptedSnapshotSource::new(script);

        let report = poll_until(
            &source,
            &min_points("rpc.count", 2),
            &settings(5)?,
            &PollDeps::new(),
        )?;

        assert_eq!(report.status(), PollStatus::Converged);
        assert_eq!(report.polls(), 2);
        assert_eq!(source.collect_calls(), 2);
        assert_eq!(report.result().points("rpc.count"), &[dp1.clone(), dp1, dp2]);
        Ok(())
    }

    #[test]
    fn exhausts_budget_without_error() -> Result<()> {
        let source = ScriptedSnapshotSource::empty();
        let logger = Arc::new(RecordingLogger::new());
        let deps = PollDeps::new().with_logger(logger.clone());

        let report = poll_until(&source, &never(), &settings(3)?, &deps)?;

        assert_eq!(report.status(), PollStatus::Exhausted);
        assert_eq!(report.polls(), 3);
        assert_eq!(source.flush_calls(), 3);
        assert_eq!(logger.events_named("probe.poll.exhausted").len(), 1);
        Ok(())
    }

    #[test]
    fn flush_failure_ends_run_with_partial_result() -> Result<()> {
        let (script, dp1, _) = rpc_count_script();
        let source = ScriptedSnapshotSource::new(script).fail_flush_at(2);

        let failure = poll_until(&source, &never(), &settings(5)?, &PollDeps::new()).err();

        let failure = failure.ok_or_else(|| {
            ErrorEnvelope::invariant(ErrorCode::internal(), "expected the run to fail")
        })?;
        assert_eq!(failure.polls(), 1);
        assert_eq!(failure.partial().points("rpc.count"), &[dp1]);
        assert_eq!(failure.error().code, ErrorCode::flush_failed());
        assert_eq!(source.collect_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn async_poll_converges() -> Result<()> {
        let (script, _, _) = rpc_count_script();
        let scripted = Arc::new(ScriptedSnapshotSource::new(script));
        let ctx = RequestContext::new_request();

        let report = poll_until_async(
            &ctx,
            scripted.clone(),
            min_points("rpc.count", 2),
            &settings(5)?,
            &PollDeps::new(),
        )
        .await?;

        assert!(report.converged());
        assert_eq!(scripted.collect_calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn async_poll_stops_when_cancelled_up_front() -> Result<()> {
        let source: SharedSnapshotSource = Arc::new(ScriptedSnapshotSource::empty());
        let ctx = RequestContext::new_request();
        ctx.cancel();

        let failure = poll_until_async(&ctx, source, never(), &settings(5)?, &PollDeps::new())
            .await
            .err();

        assert!(failure.as_ref().is_some_and(PollFailure::is_cancelled));
        assert_eq!(failure.map(|failure| failure.polls()), Some(0));
        Ok(())
    }
}
