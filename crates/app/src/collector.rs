//! Background metrics collection on a dedicated worker thread.
//!
//! The worker runs the same cycle as [`crate::poll_until`] once per interval.
//! The owner reads the accumulated view only through [`MetricsCollector::stop`].
//! One mutex guards the lifecycle state; its condvar wakes the worker early
//! when a stop is requested.

use crate::cycle::{PollCycle, PollDeps, RunTracker, duration_to_ms};
use crate::poll_until::PollResult;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use telemetry_probe_config::CollectorSettings;
use telemetry_probe_domain::{
    AccumulatedResult, PollFailure, PollOutcome, PollReport, PollStatus, Snapshot,
};
use telemetry_probe_ports::{LogFields, Predicate, SharedSnapshotSource};
use telemetry_probe_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result, panic_message};

const WORKER_THREAD_NAME: &str = "telemetry-probe-collector";

/// Lifecycle of a collector worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Spawned, waiting for the first interval to elapse.
    Idle,
    /// At least one cycle has started.
    Running,
    /// Stop requested; the worker exits before its next cycle.
    Stopping,
    /// Worker has returned (budget, convergence, failure, or stop).
    Stopped,
}

impl CollectorState {
    /// Stable name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: Mutex<CollectorState>,
    changed: Condvar,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Mutex::new(CollectorState::Idle),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> CollectorState {
        *self.lock()
    }

    /// Ask the worker to exit; a no-op once it has stopped.
    fn request_stop(&self) {
        let mut state = self.lock();
        if matches!(*state, CollectorState::Idle | CollectorState::Running) {
            *state = CollectorState::Stopping;
            self.changed.notify_all();
        }
    }

    fn mark_stopped(&self) {
        *self.lock() = CollectorState::Stopped;
        self.changed.notify_all();
    }

    /// Sleep for `interval` unless a stop arrives first.
    ///
    /// Returns `true` when the worker should exit. Otherwise the state moves
    /// to `Running` before returning.
    fn wait_for_cycle(&self, interval: Duration) -> bool {
        let deadline = Instant::now().checked_add(interval);
        let mut state = self.lock();
        loop {
            if *state == CollectorState::Stopping {
                return true;
            }
            let remaining = deadline.map_or(Duration::MAX, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                *state = CollectorState::Running;
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

/// Handle to a running background collector.
///
/// Dropping the handle without calling [`MetricsCollector::stop`] stops and
/// joins the worker. The result is still logged and counted, then discarded.
pub struct MetricsCollector {
    lifecycle: Arc<Lifecycle>,
    worker: Option<JoinHandle<PollResult>>,
    cycle: Arc<PollCycle>,
    tracker: Option<RunTracker>,
}

impl MetricsCollector {
    /// Spawn the worker thread and return its handle.
    ///
    /// The first cycle runs one interval after start.
    pub fn start(
        source: SharedSnapshotSource,
        predicate: Predicate,
        settings: CollectorSettings,
        deps: PollDeps,
    ) -> Result<Self> {
        let cycle = Arc::new(PollCycle::for_collector(&settings, &deps));
        let lifecycle = Arc::new(Lifecycle::new());

        let mut fields = LogFields::new();
        fields.insert("source".into(), Value::from(source.name()));
        fields.insert("iterations".into(), Value::from(settings.iterations()));
        fields.insert(
            "interval_ms".into(),
            Value::from(duration_to_ms(settings.interval())),
        );
        fields.insert(
            "stop_on_convergence".into(),
            Value::from(settings.stop_on_convergence()),
        );
        let tracker = RunTracker::start(&cycle, "collector", fields.clone());

        let worker = {
            let worker = Worker {
                source,
                predicate,
                settings,
                cycle: Arc::clone(&cycle),
                lifecycle: Arc::clone(&lifecycle),
            };
            std::thread::Builder::new()
                .name(WORKER_THREAD_NAME.to_owned())
                .spawn(move || worker.run())
                .map_err(|error| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::internal(),
                        format!("failed to spawn collector thread: {error}"),
                        ErrorClass::Retriable,
                    )
                    .with_metadata("operation", "collector.start")
                })?
        };

        if let Some(logger) = cycle.deps().logger.as_ref() {
            logger.info(
                "probe.collector.started",
                "Background collector started",
                Some(cycle.with_run_id(fields)),
            );
        }

        Ok(Self {
            lifecycle,
            worker: Some(worker),
            cycle,
            tracker: Some(tracker),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CollectorState {
        self.lifecycle.current()
    }

    /// Returns true once the worker has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the worker, join it, and return everything it accumulated.
    ///
    /// Stopping before the first cycle yields an empty
    /// [`PollStatus::Stopped`] report. A source failure or a source panic is
    /// returned as a [`PollFailure`] carrying the view accumulated so far.
    pub fn stop(mut self) -> PollResult {
        self.finish_run()
    }

    fn finish_run(&mut self) -> PollResult {
        self.lifecycle.request_stop();
        let result = self
            .worker
            .take()
            .map_or_else(already_joined, join_worker);

        if let Some(logger) = self.cycle.deps().logger.as_ref() {
            let (status, polls) = match &result {
                Ok(report) => (report.status().as_str(), report.polls()),
                Err(failure) => ("failed", failure.polls()),
            };
            logger.info(
                "probe.collector.stopped",
                "Background collector stopped",
                Some(self.cycle.fields([
                    ("status", Value::from(status)),
                    ("polls", Value::from(polls)),
                ])),
            );
        }

        match self.tracker.take() {
            Some(tracker) => tracker.finish(&self.cycle, result),
            None => result,
        }
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.finish_run();
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MetricsCollector")
            .field("state", &self.state())
            .field("run_id", self.cycle.run_id())
            .finish_non_exhaustive()
    }
}

/// Joins the worker. Source panics are caught inside the worker, so a join
/// error here means the worker itself panicked and its view is gone.
fn join_worker(worker: JoinHandle<PollResult>) -> PollResult {
    worker.join().unwrap_or_else(|payload| {
        let error = ErrorEnvelope::unexpected(
            ErrorCode::worker_panicked(),
            format!("collector worker panicked: {}", panic_message(payload.as_ref())),
            ErrorClass::NonRetriable,
        );
        Err(PollFailure::new(error, 0, AccumulatedResult::new()))
    })
}

fn already_joined() -> PollResult {
    Err(PollFailure::new(
        ErrorEnvelope::invariant(ErrorCode::internal(), "collector worker already joined"),
        0,
        AccumulatedResult::new(),
    ))
}

struct Worker {
    source: SharedSnapshotSource,
    predicate: Predicate,
    settings: CollectorSettings,
    cycle: Arc<PollCycle>,
    lifecycle: Arc<Lifecycle>,
}

/// Marks the collector `Stopped` when the worker returns or unwinds.
struct StoppedOnExit(Arc<Lifecycle>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

impl Worker {
    fn run(self) -> PollResult {
        let _stopped_on_exit = StoppedOnExit(Arc::clone(&self.lifecycle));

        let budget = self.settings.iterations();
        let mut accumulated = AccumulatedResult::new();
        let mut polls = 0_u32;

        while polls < budget {
            if self.lifecycle.wait_for_cycle(self.settings.interval()) {
                return Ok(PollReport::new(PollStatus::Stopped, polls, accumulated));
            }

            let poll = polls + 1;
            let snapshot = match self.observe(poll) {
                Ok(snapshot) => snapshot,
                Err(error) => return Err(PollFailure::new(error, polls, accumulated)),
            };
            let converged = self
                .cycle
                .absorb(&mut accumulated, snapshot, &self.predicate, poll);
            polls = poll;

            let early_exit = converged && self.settings.stop_on_convergence();
            match PollOutcome::decide(early_exit, poll, budget) {
                PollOutcome::Converged => {
                    return Ok(PollReport::new(PollStatus::Converged, polls, accumulated));
                },
                PollOutcome::ExhaustedBudget => {
                    let status = if converged {
                        PollStatus::Converged
                    } else {
                        PollStatus::Exhausted
                    };
                    return Ok(PollReport::new(status, polls, accumulated));
                },
                PollOutcome::ContinuePolling => {},
            }
        }

        Ok(PollReport::new(PollStatus::Exhausted, polls, accumulated))
    }

    /// Run one source call, turning a panic into an error so the view
    /// accumulated by earlier cycles survives.
    fn observe(&self, poll: u32) -> Result<Snapshot> {
        catch_unwind(AssertUnwindSafe(|| {
            self.cycle.observe(self.source.as_ref(), poll)
        }))
        .unwrap_or_else(|payload| {
            Err(ErrorEnvelope::unexpected(
                ErrorCode::worker_panicked(),
                format!("snapshot source panicked: {}", panic_message(payload.as_ref())),
                ErrorClass::NonRetriable,
            )
            .with_metadata("source", self.source.name())
            .with_metadata("poll", poll.to_string()))
        })
    }
}
