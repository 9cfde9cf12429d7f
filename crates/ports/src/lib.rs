//! # telemetry-probe-ports
//!
//! Port traits for the telemetry-probe hexagonal architecture.
//!
//! The poller only talks to the outside world through these interfaces: a
//! snapshot source to pull metric data from, and optional logging/telemetry
//! sinks. It depends only on `domain` and `shared`.

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod logger;
pub mod snapshot_source;
pub mod telemetry;

pub use logger::*;
pub use snapshot_source::*;
pub use telemetry::*;

// Re-export the domain types used in port signatures, so adapter crates can
// implement ports without directly depending on `telemetry-probe-domain`.
pub use telemetry_probe_domain::{AccumulatedResult, DataPoint, InstrumentName, Snapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_probe_domain::domain_crate_version;
    use telemetry_probe_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("telemetry-probe-") {
                let key = line.split('=').next().unwrap_or("").trim();
                let name = key.split('.').next().unwrap_or("").trim();
                deps.push(name.to_string());
            }
        }

        deps
    }

    #[test]
    fn ports_depends_only_on_domain_and_shared() {
        let deps = workspace_deps();
        let allowed = ["telemetry-probe-domain", "telemetry-probe-shared"];

        for dep in &deps {
            assert!(
                allowed.contains(&dep.as_str()),
                "unexpected dependency found: {dep}"
            );
        }

        for expected in allowed {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
    }

    #[test]
    fn ports_can_use_domain_and_shared() {
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
