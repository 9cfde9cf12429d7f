//! Test fixtures for shared error codes and envelopes.

use telemetry_probe_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Return the error codes a poll run can surface.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::cancelled(),
        ErrorCode::invalid_input(),
        ErrorCode::flush_failed(),
        ErrorCode::collect_failed(),
        ErrorCode::worker_panicked(),
        ErrorCode::internal(),
    ]
}

/// A cancellation error fixture.
pub fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("cancelled")
}

/// A retriable flush failure, as an exporter outage would produce.
pub fn flush_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::flush_failed(),
        "exporter unavailable",
        ErrorClass::Retriable,
    )
}

/// A non-retriable collect failure, as a closed reader would produce.
pub fn collect_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::collect_failed(),
        "reader is shut down",
        ErrorClass::NonRetriable,
    )
}
