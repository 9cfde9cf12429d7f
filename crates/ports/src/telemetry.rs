//! Telemetry boundary contract (counters + timings) for the poller itself.

use std::collections::BTreeMap;

/// Telemetry tags. Keep tags low-cardinality: policy and status, never attribute values.
pub type TelemetryTags = BTreeMap<Box<str>, Box<str>>;

/// Build tags from static key/value pairs.
#[must_use]
pub fn telemetry_tags<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> TelemetryTags {
    pairs
        .into_iter()
        .map(|(key, value)| (Box::from(key), Box::from(value)))
        .collect()
}

/// Timer handle.
pub trait TelemetryTimer: Send + Sync {
    /// Stop the timer and record its duration.
    fn stop(&self);
}

/// Boundary contract for poller telemetry.
pub trait TelemetryPort: Send + Sync {
    /// Increment a counter by `value`.
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>);

    /// Record a duration (in milliseconds) for an operation.
    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>);

    /// Start a timer and return a handle that records on `stop()`.
    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sorted_by_key() {
        let tags = telemetry_tags([("status", "converged"), ("policy", "append")]);
        let keys: Vec<&str> = tags.keys().map(AsRef::as_ref).collect();
        assert_eq!(keys, vec!["policy", "status"]);
    }
}
