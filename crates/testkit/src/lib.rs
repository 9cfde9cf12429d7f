//! # telemetry-probe-testkit
//!
//! Test helpers: scripted and in-memory snapshot sources, data point
//! fixtures, and recording logger/telemetry doubles.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod errors;
pub mod fixtures;
pub mod in_memory;
pub mod metric_reader;
pub mod scripted;

pub use in_memory::{NoopLogger, NoopTelemetry, RecordingLogger, RecordingTelemetry};
pub use metric_reader::{InMemoryMetricReader, Temporality};
pub use scripted::{AfterScript, ScriptedSnapshotSource};

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
