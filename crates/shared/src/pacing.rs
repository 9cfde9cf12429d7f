//! Interruptible pacing between poll cycles.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::time::{Duration, Instant};

/// Sleep for `delay`, returning a cancellation error as soon as `ctx` is cancelled.
///
/// The error carries `operation` in its metadata.
pub async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Milliseconds elapsed since `started`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}
