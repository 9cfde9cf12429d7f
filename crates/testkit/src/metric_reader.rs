//! Hand-fed snapshot source that mimics a periodic exporter's publish lag.
//!
//! Points recorded through [`InMemoryMetricReader::record`] start out pending.
//! Each flush ages them by one step; once a point has aged
//! `publish_after_flushes` times it is exported and visible to collect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use telemetry_probe_domain::{DataPoint, InstrumentName, Snapshot};
use telemetry_probe_ports::SnapshotSource;
use telemetry_probe_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};

/// How exported points are handed out by collect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Temporality {
    /// Collect drains exported points; each point is reported once.
    #[default]
    Delta,
    /// Collect returns every point exported so far.
    Cumulative,
}

impl Temporality {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Cumulative => "cumulative",
        }
    }
}

#[derive(Debug)]
struct PendingPoint {
    name: InstrumentName,
    point: DataPoint,
    flushes_left: u32,
}

#[derive(Debug, Default)]
struct ReaderState {
    pending: Vec<PendingPoint>,
    exported: Snapshot,
}

/// Snapshot source that tests feed directly, with a configurable export lag.
#[derive(Debug, Default)]
pub struct InMemoryMetricReader {
    temporality: Temporality,
    publish_after_flushes: u32,
    state: Mutex<ReaderState>,
    shut_down: AtomicBool,
}

impl InMemoryMetricReader {
    /// Create a reader that publishes on the next flush.
    #[must_use]
    pub fn new(temporality: Temporality) -> Self {
        Self {
            temporality,
            publish_after_flushes: 1,
            ..Self::default()
        }
    }

    /// Delay publication until a point has seen `flushes` flushes.
    ///
    /// Values below one are treated as one.
    #[must_use]
    pub fn with_publish_delay(mut self, flushes: u32) -> Self {
        self.publish_after_flushes = flushes.max(1);
        self
    }

    /// Configured temporality.
    #[must_use]
    pub const fn temporality(&self) -> Temporality {
        self.temporality
    }

    /// Record a point for `name`; it becomes visible after enough flushes.
    pub fn record(&self, name: &str, point: DataPoint) -> Result<()> {
        let name = InstrumentName::parse(name)?;
        self.lock().pending.push(PendingPoint {
            name,
            point,
            flushes_left: self.publish_after_flushes,
        });
        Ok(())
    }

    /// Points recorded but not yet exported.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Points exported and not yet drained.
    #[must_use]
    pub fn exported_count(&self) -> usize {
        self.lock().exported.point_count()
    }

    /// Make every later flush and collect fail.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Self::shutdown`] was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self, code: ErrorCode, operation: &str) -> Result<()> {
        if self.is_shut_down() {
            return Err(ErrorEnvelope::unexpected(
                code,
                "metric reader is shut down",
                ErrorClass::NonRetriable,
            )
            .with_metadata("operation", operation)
            .with_metadata("source", self.name()));
        }
        Ok(())
    }
}

impl SnapshotSource for InMemoryMetricReader {
    fn force_flush(&self, deadline: Duration) -> Result<bool> {
        self.ensure_open(ErrorCode::flush_failed(), "force_flush")?;

        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        let mut published = 0_usize;
        for mut entry in pending {
            entry.flushes_left = entry.flushes_left.saturating_sub(1);
            if entry.flushes_left == 0 {
                state.exported.push(entry.name, entry.point);
                published += 1;
            } else {
                state.pending.push(entry);
            }
        }

        tracing::debug!(
            published,
            still_pending = state.pending.len(),
            deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            "in-memory reader flushed"
        );
        Ok(state.pending.is_empty())
    }

    fn collect_snapshot(&self) -> Result<Snapshot> {
        self.ensure_open(ErrorCode::collect_failed(), "collect_snapshot")?;

        let mut state = self.lock();
        Ok(match self.temporality {
            Temporality::Delta => std::mem::take(&mut state.exported),
            Temporality::Cumulative => state.exported.clone(),
        })
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLUSH: Duration = Duration::from_millis(100);

    #[test]
    fn nothing_is_visible_before_a_flush() -> Result<()> {
        let reader = InMemoryMetricReader::new(Temporality::Delta);
        reader.record("rpc.count", DataPoint::counter(1))?;

        assert!(reader.collect_snapshot()?.is_empty());
        assert_eq!(reader.pending_count(), 1);
        Ok(())
    }

    #[test]
    fn delta_drains_on_collect() -> Result<()> {
        let reader = InMemoryMetricReader::new(Temporality::Delta);
        reader.record("rpc.count", DataPoint::counter(1))?;

        assert!(reader.force_flush(FLUSH)?);
        assert_eq!(reader.collect_snapshot()?.points("rpc.count").len(), 1);
        assert!(reader.collect_snapshot()?.is_empty());
        Ok(())
    }

    #[test]
    fn cumulative_keeps_exported_points() -> Result<()> {
        let reader = InMemoryMetricReader::new(Temporality::Cumulative);
        reader.record("rpc.count", DataPoint::counter(1))?;
        reader.force_flush(FLUSH)?;
        reader.record("rpc.count", DataPoint::counter(2))?;
        reader.force_flush(FLUSH)?;

        assert_eq!(reader.collect_snapshot()?.points("rpc.count").len(), 2);
        assert_eq!(reader.collect_snapshot()?.points("rpc.count").len(), 2);
        assert_eq!(reader.exported_count(), 2);
        Ok(())
    }

    #[test]
    fn publish_delay_holds_points_back() -> Result<()> {
        let reader = InMemoryMetricReader::new(Temporality::Delta).with_publish_delay(3);
        reader.record("rpc.count", DataPoint::counter(1))?;

        assert!(!reader.force_flush(FLUSH)?);
        assert!(!reader.force_flush(FLUSH)?);
        assert!(reader.collect_snapshot()?.is_empty());
        assert!(reader.force_flush(FLUSH)?);
        assert_eq!(reader.collect_snapshot()?.point_count(), 1);
        Ok(())
    }

    #[test]
    fn zero_delay_behaves_like_one() -> Result<()> {
        let reader = InMemoryMetricReader::new(Temporality::Delta).with_publish_delay(0);
        reader.record("rpc.count", DataPoint::counter(1))?;

        assert!(reader.force_flush(FLUSH)?);
        assert_eq!(reader.exported_count(), 1);
        Ok(())
    }

    #[test]
    fn blank_instrument_name_is_rejected() {
        let reader = InMemoryMetricReader::new(Temporality::Delta);
        let error = reader.record("   ", DataPoint::counter(1)).err();

        assert!(error.is_some());
        assert_eq!(reader.pending_count(), 0);
    }

    #[test]
    fn shutdown_fails_flush_and_collect() {
        let reader = InMemoryMetricReader::new(Temporality::Delta);
        reader.shutdown();

        let flush = reader.force_flush(FLUSH).err();
        let collect = reader.collect_snapshot().err();

        assert_eq!(flush.map(|error| error.code), Some(ErrorCode::flush_failed()));
        assert_eq!(
            collect.map(|error| error.code),
            Some(ErrorCode::collect_failed())
        );
    }
}
