//! Scripted snapshot source for deterministic poll tests.

use crate::errors::{collect_error, flush_error};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use telemetry_probe_domain::Snapshot;
use telemetry_probe_ports::SnapshotSource;
use telemetry_probe_shared::{ErrorEnvelope, Result};

/// What a scripted source returns once its script is used up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AfterScript {
    /// Keep returning the last scripted snapshot.
    #[default]
    RepeatLast,
    /// Return empty snapshots.
    Empty,
}

/// Snapshot source that replays a fixed list of snapshots.
///
/// Call numbers used by the failure and panic knobs are 1-based and count
/// calls to the named method only.
#[derive(Debug, Default)]
pub struct ScriptedSnapshotSource {
    script: Vec<Snapshot>,
    after_script: AfterScript,
    incomplete_flushes: BTreeSet<u32>,
    flush_failure: Option<(u32, ErrorEnvelope)>,
    collect_failure: Option<(u32, ErrorEnvelope)>,
    collect_panic: Option<u32>,
    collect_delay: Option<Duration>,
    flush_calls: AtomicU32,
    collect_calls: AtomicU32,
    deadlines: Mutex<Vec<Duration>>,
}

impl ScriptedSnapshotSource {
    /// Replay `script` in order, then repeat the last entry.
    pub fn new(script: impl IntoIterator<Item = Snapshot>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A source that never reports anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Choose what happens after the script runs out.
    #[must_use]
    pub fn after_script(mut self, after_script: AfterScript) -> Self {
        self.after_script = after_script;
        self
    }

    /// Report `Ok(false)` from the given flush call.
    #[must_use]
    pub fn incomplete_flush_at(mut self, call: u32) -> Self {
        self.incomplete_flushes.insert(call);
        self
    }

    /// Fail the given flush call with a flush error.
    #[must_use]
    pub fn fail_flush_at(self, call: u32) -> Self {
        self.fail_flush_with(call, flush_error())
    }

    /// Fail the given flush call with `error`.
    #[must_use]
    pub fn fail_flush_with(mut self, call: u32, error: ErrorEnvelope) -> Self {
        self.flush_failure = Some((call, error));
        self
    }

    /// Fail the given collect call with a collect error.
    #[must_use]
    pub fn fail_collect_at(self, call: u32) -> Self {
        self.fail_collect_with(call, collect_error())
    }

    /// Fail the given collect call with `error`.
    #[must_use]
    pub fn fail_collect_with(mut self, call: u32, error: ErrorEnvelope) -> Self {
        self.collect_failure = Some((call, error));
        self
    }

    /// Panic inside the given collect call.
    #[must_use]
    pub fn panic_on_collect_at(mut self, call: u32) -> Self {
        self.collect_panic = Some(call);
        self
    }

    /// Block every collect call for `delay`.
    #[must_use]
    pub fn with_collect_delay(mut self, delay: Duration) -> Self {
        self.collect_delay = Some(delay);
        self
    }

    /// Number of `force_flush` calls so far.
    pub fn flush_calls(&self) -> u32 {
        self.flush_calls.load(Ordering::SeqCst)
    }

    /// Number of `collect_snapshot` calls so far.
    pub fn collect_calls(&self) -> u32 {
        self.collect_calls.load(Ordering::SeqCst)
    }

    /// Deadlines passed to `force_flush`, in call order.
    pub fn flush_deadlines(&self) -> Vec<Duration> {
        self.deadlines.lock().expect("deadlines lock").clone()
    }

    fn snapshot_for(&self, call: u32) -> Snapshot {
        let index = usize::try_from(call.saturating_sub(1)).unwrap_or(usize::MAX);
        if let Some(snapshot) = self.script.get(index) {
            return snapshot.clone();
        }
        match self.after_script {
            AfterScript::RepeatLast => self.script.last().cloned().unwrap_or_default(),
            AfterScript::Empty => Snapshot::new(),
        }
    }
}

impl SnapshotSource for ScriptedSnapshotSource {
    fn force_flush(&self, deadline: Duration) -> Result<bool> {
        let call = self.flush_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.deadlines.lock().expect("deadlines lock").push(deadline);
        if let Some((at, error)) = &self.flush_failure {
            if *at == call {
                return Err(error.clone());
            }
        }
        Ok(!self.incomplete_flushes.contains(&call))
    }

    fn collect_snapshot(&self) -> Result<Snapshot> {
        let call = self.collect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.collect_delay {
            std::thread::sleep(delay);
        }
        if self.collect_panic == Some(call) {
            panic!("scripted collect panic on call {call}");
        }
        if let Some((at, error)) = &self.collect_failure {
            if *at == call {
                return Err(error.clone());
            }
        }
        Ok(self.snapshot_for(call))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
