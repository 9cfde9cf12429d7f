//! Result helpers for shared error handling.

use crate::errors::ErrorEnvelope;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers for tagging envelope errors at a boundary.
pub trait ResultExt<T> {
    /// Tag the error with the operation that produced it.
    ///
    /// An `operation` entry already set by the producer is preserved.
    fn with_operation(self, operation: &'static str) -> Result<T>;

    /// Attach a metadata entry to the error, preserving the success value.
    fn with_error_metadata(self, key: &'static str, value: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_operation(self, operation: &'static str) -> Self {
        self.map_err(|error| error.with_default_metadata("operation", operation))
    }

    fn with_error_metadata(self, key: &'static str, value: impl Into<String>) -> Self {
        self.map_err(|error| error.with_metadata(key, value))
    }
}
