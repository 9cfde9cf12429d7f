//! Snapshot source boundary contract.
//!
//! A snapshot source wraps whatever reader the code under test exports
//! metrics to. The poller calls it strictly sequentially from one thread:
//! `force_flush` first, then `collect_snapshot`.

use std::sync::Arc;
use std::time::Duration;
use telemetry_probe_domain::{AccumulatedResult, Snapshot};
use telemetry_probe_shared::Result;

/// Source of metric snapshots.
pub trait SnapshotSource: Send + Sync {
    /// Push buffered telemetry through to the reader.
    ///
    /// `deadline` is advisory; the poller does not enforce it. Returns
    /// `Ok(false)` when the source could not finish in time. The poller still
    /// collects after an incomplete flush.
    fn force_flush(&self, deadline: Duration) -> Result<bool>;

    /// Return the data points currently visible, grouped by instrument.
    fn collect_snapshot(&self) -> Result<Snapshot>;

    /// Short name used in log fields.
    fn name(&self) -> &str {
        "snapshot-source"
    }
}

/// Shared handle to a snapshot source.
pub type SharedSnapshotSource = Arc<dyn SnapshotSource>;

/// Convergence predicate over the accumulated view.
///
/// Returns `true` once the data is complete enough to assert on. Evaluated
/// after every merge; it must not have side effects the poller relies on.
pub type Predicate = Arc<dyn Fn(&AccumulatedResult) -> bool + Send + Sync>;
