//! # telemetry-probe-domain
//!
//! Metric data and poll-run outcomes for the convergence poller.
//!
//! - **Metrics** - `InstrumentName`, `DataPoint`, `PointValue`, `HistogramPoint`
//! - **Snapshots** - `Snapshot`, `AccumulatedResult`, `MergePolicy`, `merge`
//! - **Outcomes** - `PollOutcome`, `PollStatus`, `PollReport`, `PollFailure`
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// Re-export shared types for convenience
pub use telemetry_probe_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod metrics;
pub mod outcome;
pub mod snapshot;

pub use metrics::{DataPoint, HistogramPoint, InstrumentName, MetricError, Number, PointValue};
pub use outcome::{PollFailure, PollOutcome, PollReport, PollStatus};
pub use snapshot::{AccumulatedResult, MergePolicy, Snapshot, UnknownMergePolicy, merge};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================
