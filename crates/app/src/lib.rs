//! # telemetry-probe-app
//!
//! Poll loops over a snapshot source: a blocking poller, its async twin, and
//! a background collector thread. All three share one cycle implementation.
//! This crate depends on `ports`, `domain`, `config`, and `shared`.

pub mod collector;
pub mod cycle;
pub mod poll_until;
pub mod predicates;

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub use collector::{CollectorState, MetricsCollector};
pub use cycle::PollDeps;
pub use poll_until::{PollResult, poll_until, poll_until_async};
pub use predicates::{
    all_of, always, any_of, has_instruments, min_points, never, points_matching, predicate,
};

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_probe_config::config_crate_version;
    use telemetry_probe_domain::domain_crate_version;
    use telemetry_probe_ports::ports_crate_version;
    use telemetry_probe_shared::shared_crate_version;

    #[test]
    fn app_crate_compiles() {
        let version = app_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn app_can_use_ports_domain_config_shared() {
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
        assert!(!config_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
