//! # telemetry-probe-adapters
//!
//! Adapter implementations for the ports: JSON and `tracing` loggers, JSON
//! telemetry, global subscriber setup, and a snapshot source over the
//! OpenTelemetry SDK's in-memory exporter.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod log_sink;
pub mod logger;
pub mod otel_source;
pub mod telemetry;
pub mod tracing_init;

pub use log_sink::{LogSink, MemoryLogSink, StderrLogSink};
pub use logger::{JsonLogger, TracingLogger};
pub use otel_source::OtelSnapshotSource;
pub use telemetry::JsonTelemetry;
pub use tracing_init::{DEFAULT_FILTER, TracingFormat, init_tracing};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
