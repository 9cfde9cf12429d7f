//! Secret detection for log fields and configuration diagnostics.
//!
//! Metric attributes and log fields are free-form; anything whose key looks
//! like a credential is replaced with [`REDACTED`] before it leaves the process.

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

/// Checks if a key/variable name likely refers to a secret.
///
/// Matching is case-insensitive.
///
/// # Examples
///
/// ```
/// use telemetry_probe_shared::is_secret_key;
///
/// assert!(is_secret_key("exporter_api_key"));
/// assert!(is_secret_key("Authorization"));
/// assert!(!is_secret_key("PROBE_POLL_INTERVAL_MS"));
/// ```
#[must_use]
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("KEY")
        || key.contains("TOKEN")
        || key.contains("SECRET")
        || key.contains("PASSWORD")
        || key.contains("CREDENTIAL")
        || key.contains("AUTH")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_credential_like_keys() {
        assert!(is_secret_key("OTEL_EXPORTER_OTLP_HEADERS_API_KEY"));
        assert!(is_secret_key("bearer_token"));
        assert!(is_secret_key("client_secret"));
        assert!(is_secret_key("basic_auth"));
        assert!(is_secret_key("grpc.credentials"));
    }

    #[test]
    fn leaves_metric_keys_alone() {
        assert!(!is_secret_key("grpc.method"));
        assert!(!is_secret_key("grpc.status"));
        assert!(!is_secret_key("PROBE_COLLECTOR_ITERATIONS"));
        assert!(!is_secret_key("instrument"));
    }
}
