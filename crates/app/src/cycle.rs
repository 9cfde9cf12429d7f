//! One flush/collect/merge/evaluate cycle, shared by every poll loop.
//!
//! The loops in `poll_until` and `collector` only decide *when* to run a
//! cycle; this module owns *what* a cycle does and what it reports.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_probe_config::{CollectorSettings, PollerSettings};
use telemetry_probe_domain::{
    AccumulatedResult, InstrumentName, MergePolicy, PollFailure, PollReport, PollStatus, Snapshot,
};
use telemetry_probe_ports::{
    LogFields, LoggerPort, Predicate, SnapshotSource, TelemetryPort, TelemetryTags,
    TelemetryTimer, telemetry_tags,
};
use telemetry_probe_shared::{CorrelationId, Result, ResultExt, duration_ms};

/// Optional observability sinks for a poll run.
#[derive(Clone, Default)]
pub struct PollDeps {
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry sink.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

impl PollDeps {
    /// Dependencies with no logger and no telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn LoggerPort>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Attach a telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryPort>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

impl std::fmt::Debug for PollDeps {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PollDeps")
            .field("logger", &self.logger.is_some())
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}

/// Settings and sinks needed to run a single cycle.
#[derive(Debug)]
pub(crate) struct PollCycle {
    flush_timeout: Duration,
    merge_policy: MergePolicy,
    instruments: Option<BTreeSet<InstrumentName>>,
    deps: PollDeps,
    run_id: CorrelationId,
}

impl PollCycle {
    pub(crate) fn for_poller(settings: &PollerSettings, deps: &PollDeps) -> Self {
        Self {
            flush_timeout: settings.flush_timeout(),
            merge_policy: settings.merge_policy(),
            instruments: settings.instruments().cloned(),
            deps: deps.clone(),
            run_id: CorrelationId::new_run_id(),
        }
    }

    pub(crate) fn for_collector(settings: &CollectorSettings, deps: &PollDeps) -> Self {
        Self {
            flush_timeout: settings.flush_timeout(),
            merge_policy: settings.merge_policy(),
            instruments: settings.instruments().cloned(),
            deps: deps.clone(),
            run_id: CorrelationId::new_run_id(),
        }
    }

    pub(crate) const fn run_id(&self) -> &CorrelationId {
        &self.run_id
    }

    pub(crate) const fn deps(&self) -> &PollDeps {
        &self.deps
    }

    pub(crate) const fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Flush the source, then collect and filter a snapshot.
    ///
    /// Errors are tagged with the failing operation and the poll number.
    pub(crate) fn observe(&self, source: &dyn SnapshotSource, poll: u32) -> Result<Snapshot> {
        let flushed = source
            .force_flush(self.flush_timeout)
            .with_operation("force_flush")
            .with_error_metadata("poll", poll.to_string())?;
        if !flushed {
            if let Some(logger) = self.deps.logger.as_ref() {
                logger.warn(
                    "probe.poll.flush_incomplete",
                    "Snapshot source did not finish flushing before the deadline",
                    Some(self.fields([
                        ("poll", Value::from(poll)),
                        ("source", Value::from(source.name())),
                        ("flush_timeout_ms", Value::from(duration_to_ms(self.flush_timeout))),
                    ])),
                );
            }
        }

        let snapshot = source
            .collect_snapshot()
            .with_operation("collect_snapshot")
            .with_error_metadata("poll", poll.to_string())?;

        Ok(match self.instruments.as_ref() {
            Some(allowed) => snapshot.filtered(allowed),
            None => snapshot,
        })
    }

    /// Merge `snapshot` and evaluate the predicate on the merged view.
    pub(crate) fn absorb(
        &self,
        accumulated: &mut AccumulatedResult,
        snapshot: Snapshot,
        predicate: &Predicate,
        poll: u32,
    ) -> bool {
        let observed = snapshot.point_count();
        accumulated.merge(snapshot, self.merge_policy);
        let converged = predicate(accumulated);

        if let Some(telemetry) = self.deps.telemetry.as_ref() {
            telemetry.increment_counter("probe.poll.cycles", 1, Some(&self.tags()));
        }
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.debug(
                "probe.poll.cycle",
                "Poll cycle completed",
                Some(self.fields([
                    ("poll", Value::from(poll)),
                    ("observed_points", Value::from(observed)),
                    ("total_points", Value::from(accumulated.total_points())),
                    ("converged", Value::from(converged)),
                ])),
            );
        }

        converged
    }

    pub(crate) fn tags(&self) -> TelemetryTags {
        telemetry_tags([("policy", self.merge_policy.as_str())])
    }

    /// Log fields for this run, with `run_id` always present.
    pub(crate) fn fields<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> LogFields {
        self.with_run_id(
            pairs
                .into_iter()
                .map(|(key, value)| (Box::from(key), value))
                .collect(),
        )
    }

    pub(crate) fn with_run_id(&self, mut fields: LogFields) -> LogFields {
        fields.insert("run_id".into(), Value::from(self.run_id.as_str()));
        fields
    }
}

/// Start/finish bookkeeping for one run: the total timer plus terminal logs
/// and counters.
pub(crate) struct RunTracker {
    started_at: Instant,
    total_timer: Option<Box<dyn TelemetryTimer>>,
}

impl RunTracker {
    pub(crate) fn start(cycle: &PollCycle, mode: &'static str, fields: LogFields) -> Self {
        let started_at = Instant::now();
        let total_timer = cycle
            .deps()
            .telemetry
            .as_ref()
            .map(|telemetry| telemetry.start_timer("probe.poll.total", Some(&cycle.tags())));

        if let Some(logger) = cycle.deps().logger.as_ref() {
            let mut start_fields = cycle.with_run_id(fields);
            start_fields.insert("mode".into(), Value::from(mode));
            start_fields.insert(
                "merge_policy".into(),
                Value::from(cycle.merge_policy().as_str()),
            );
            logger.info("probe.poll.start", "Poll run started", Some(start_fields));
        }

        Self {
            started_at,
            total_timer,
        }
    }

    /// Record the terminal state of the run and pass the result through.
    pub(crate) fn finish(
        self,
        cycle: &PollCycle,
        result: std::result::Result<PollReport, PollFailure>,
    ) -> std::result::Result<PollReport, PollFailure> {
        if let Some(timer) = self.total_timer.as_ref() {
            timer.stop();
        }
        let elapsed_ms = duration_ms(self.started_at);
        let deps = cycle.deps();

        match &result {
            Ok(report) => {
                let (event, message) = match report.status() {
                    PollStatus::Converged => ("probe.poll.converged", "Poll run converged"),
                    PollStatus::Exhausted => {
                        ("probe.poll.exhausted", "Poll budget exhausted without convergence")
                    },
                    PollStatus::Stopped => ("probe.poll.stopped", "Poll run stopped by owner"),
                };
                if let Some(telemetry) = deps.telemetry.as_ref() {
                    telemetry.increment_counter(event, 1, Some(&cycle.tags()));
                }
                if let Some(logger) = deps.logger.as_ref() {
                    logger.info(
                        event,
                        message,
                        Some(cycle.fields([
                            ("status", Value::from(report.status().as_str())),
                            ("polls", Value::from(report.polls())),
                            ("total_points", Value::from(report.result().total_points())),
                            ("duration_ms", Value::from(elapsed_ms)),
                        ])),
                    );
                }
            },
            Err(failure) => {
                if let Some(telemetry) = deps.telemetry.as_ref() {
                    telemetry.increment_counter("probe.poll.failed", 1, Some(&cycle.tags()));
                }
                if let Some(logger) = deps.logger.as_ref() {
                    logger.error(
                        "probe.poll.failed",
                        failure.error(),
                        Some(cycle.fields([
                            ("polls", Value::from(failure.polls())),
                            ("cancelled", Value::from(failure.is_cancelled())),
                            ("total_points", Value::from(failure.partial().total_points())),
                            ("duration_ms", Value::from(elapsed_ms)),
                        ])),
                    );
                }
            },
        }

        result
    }
}

pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_probe_testkit::fixtures::{counter_point, snapshot_of};
    use telemetry_probe_testkit::{RecordingLogger, RecordingTelemetry, ScriptedSnapshotSource};

    fn recording_cycle(
        settings: &PollerSettings,
    ) -> (PollCycle, Arc<RecordingLogger>, Arc<RecordingTelemetry>) {
        let logger = Arc::new(RecordingLogger::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let deps = PollDeps::new()
            .with_logger(logger.clone())
            .with_telemetry(telemetry.clone());
        (PollCycle::for_poller(settings, &deps), logger, telemetry)
    }

    #[test]
    fn incomplete_flush_warns_and_still_collects() -> Result<()> {
        let settings = PollerSettings::new(3, Duration::from_millis(1))?;
        let (cycle, logger, _) = recording_cycle(&settings);
        let source =
            ScriptedSnapshotSource::new([snapshot_of("rpc.count", [counter_point(1, 1)])])
                .incomplete_flush_at(1);

        let snapshot = cycle.observe(&source, 1)?;

        assert_eq!(snapshot.point_count(), 1);
        assert_eq!(source.collect_calls(), 1);
        assert_eq!(
            logger.field("probe.poll.flush_incomplete", "poll"),
            Some(Value::from(1))
        );
        Ok(())
    }

    #[test]
    fn observe_filters_to_allowed_instruments() -> Result<()> {
        let settings =
            PollerSettings::new(3, Duration::from_millis(1))?.with_instruments(["rpc.count"])?;
        let (cycle, _, _) = recording_cycle(&settings);
        let source = ScriptedSnapshotSource::new([snapshot_of("rpc.count", [counter_point(1, 1)])
            .with_points(
                telemetry_probe_testkit::fixtures::instrument("rpc.bytes"),
                [counter_point(64, 2)],
            )]);

        let snapshot = cycle.observe(&source, 1)?;

        assert_eq!(snapshot.instrument_count(), 1);
        assert!(snapshot.points("rpc.bytes").is_empty());
        Ok(())
    }

    #[test]
    fn source_errors_carry_operation_and_poll() -> Result<()> {
        let settings = PollerSettings::new(3, Duration::from_millis(1))?;
        let (cycle, _, _) = recording_cycle(&settings);
        let source = ScriptedSnapshotSource::empty().fail_collect_at(1);

        let error = cycle.observe(&source, 4).err();

        let metadata = error.map(|error| error.metadata).unwrap_or_default();
        assert_eq!(
            metadata.get("operation").map(String::as_str),
            Some("collect_snapshot")
        );
        assert_eq!(metadata.get("poll").map(String::as_str), Some("4"));
        Ok(())
    }

    #[test]
    fn absorb_counts_cycles_and_logs_debug() -> Result<()> {
        let settings = PollerSettings::new(3, Duration::from_millis(1))?;
        let (cycle, logger, telemetry) = recording_cycle(&settings);
        let predicate: Predicate = Arc::new(|view: &AccumulatedResult| view.total_points() >= 2);
        let mut accumulated = AccumulatedResult::new();

        let first = cycle.absorb(
            &mut accumulated,
            snapshot_of("rpc.count", [counter_point(1, 1)]),
            &predicate,
            1,
        );
        let second = cycle.absorb(
            &mut accumulated,
            snapshot_of("rpc.count", [counter_point(1, 2)]),
            &predicate,
            2,
        );

        assert!(!first);
        assert!(second);
        assert_eq!(telemetry.counter("probe.poll.cycles"), 2);
        assert_eq!(logger.events_named("probe.poll.cycle").len(), 2);
        Ok(())
    }
}
