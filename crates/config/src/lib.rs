//! # telemetry-probe-config
//!
//! Configuration schema, validation, and normalization for poll runs and
//! background collectors. This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (file + env).
pub mod load;
/// Configuration schema types and runtime settings.
pub mod schema;

pub use schema::{
    CURRENT_CONFIG_VERSION, CollectorConfig, CollectorSettings, ConfigSchemaError, PollConfig,
    PollerSettings, ProbeConfig, ProbeLimits, ValidatedProbeConfig, parse_probe_config_json,
    parse_probe_config_toml,
};

pub use env::{EnvParseError, ProbeEnv, apply_env_overrides};
pub use load::{
    load_probe_config_from_path, load_probe_config_from_sources, load_probe_config_std_env,
    to_pretty_json, to_pretty_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_probe_domain::domain_crate_version;
    use telemetry_probe_shared::shared_crate_version;

    #[test]
    fn config_crate_compiles() {
        let version = config_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn config_can_use_domain_and_shared() {
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
