//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict: a variable that is present but empty or malformed
//! fails fast instead of silently falling back to the file value.

use crate::schema::{ProbeConfig, ValidatedProbeConfig};
use std::collections::BTreeMap;
use std::fmt;
use telemetry_probe_domain::MergePolicy;
use telemetry_probe_shared::{ErrorCode, ErrorEnvelope};

/// Env var: poll budget.
pub const ENV_POLL_MAX_ITERATIONS: &str = "PROBE_POLL_MAX_ITERATIONS";
/// Env var: poll delay in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "PROBE_POLL_INTERVAL_MS";
/// Env var: flush deadline in milliseconds.
pub const ENV_POLL_FLUSH_TIMEOUT_MS: &str = "PROBE_POLL_FLUSH_TIMEOUT_MS";
/// Env var: merge policy (`append` | `replace`).
pub const ENV_POLL_MERGE_POLICY: &str = "PROBE_POLL_MERGE_POLICY";
/// Env var: collector budget.
pub const ENV_COLLECTOR_ITERATIONS: &str = "PROBE_COLLECTOR_ITERATIONS";
/// Env var: collector delay in milliseconds.
pub const ENV_COLLECTOR_INTERVAL_MS: &str = "PROBE_COLLECTOR_INTERVAL_MS";
/// Env var: end the collector once the predicate holds.
pub const ENV_COLLECTOR_STOP_ON_CONVERGENCE: &str = "PROBE_COLLECTOR_STOP_ON_CONVERGENCE";

const ALL_ENV_VARS: [&str; 7] = [
    ENV_POLL_MAX_ITERATIONS,
    ENV_POLL_INTERVAL_MS,
    ENV_POLL_FLUSH_TIMEOUT_MS,
    ENV_POLL_MERGE_POLICY,
    ENV_COLLECTOR_ITERATIONS,
    ENV_COLLECTOR_INTERVAL_MS,
    ENV_COLLECTOR_STOP_ON_CONVERGENCE,
];

/// Typed env-derived overrides for `ProbeConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeEnv {
    /// Override for `poll.maxIterations`.
    pub poll_max_iterations: Option<u32>,
    /// Override for `poll.intervalMs`.
    pub poll_interval_ms: Option<u64>,
    /// Override for `poll.flushTimeoutMs`.
    pub poll_flush_timeout_ms: Option<u64>,
    /// Override for `poll.mergePolicy`.
    pub poll_merge_policy: Option<MergePolicy>,
    /// Override for `collector.iterations`.
    pub collector_iterations: Option<u32>,
    /// Override for `collector.intervalMs`.
    pub collector_interval_ms: Option<u64>,
    /// Override for `collector.stopOnConvergence`.
    pub collector_stop_on_convergence: Option<bool>,
}

impl ProbeEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            poll_max_iterations: parse_optional_u32(map, ENV_POLL_MAX_ITERATIONS)?,
            poll_interval_ms: parse_optional_u64(map, ENV_POLL_INTERVAL_MS)?,
            poll_flush_timeout_ms: parse_optional_u64(map, ENV_POLL_FLUSH_TIMEOUT_MS)?,
            poll_merge_policy: parse_optional_merge_policy(map, ENV_POLL_MERGE_POLICY)?,
            collector_iterations: parse_optional_u32(map, ENV_COLLECTOR_ITERATIONS)?,
            collector_interval_ms: parse_optional_u64(map, ENV_COLLECTOR_INTERVAL_MS)?,
            collector_stop_on_convergence: parse_optional_bool(
                map,
                ENV_COLLECTOR_STOP_ON_CONVERGENCE,
            )?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map: BTreeMap<String, String> = ALL_ENV_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .map(|value| ((*name).to_string(), value))
            })
            .collect();
        Self::from_map(&map)
    }

    /// Returns true when no override is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: ProbeConfig,
    env: &ProbeEnv,
) -> Result<ValidatedProbeConfig, ErrorEnvelope> {
    let mut config = base;
    set_if_present(&mut config.poll.max_iterations, env.poll_max_iterations);
    set_if_present(&mut config.poll.interval_ms, env.poll_interval_ms);
    set_if_present(&mut config.poll.flush_timeout_ms, env.poll_flush_timeout_ms);
    set_if_present(&mut config.poll.merge_policy, env.poll_merge_policy);
    set_if_present(&mut config.collector.iterations, env.collector_iterations);
    set_if_present(&mut config.collector.interval_ms, env.collector_interval_ms);
    set_if_present(
        &mut config.collector.stop_on_convergence,
        env.collector_stop_on_convergence,
    );

    config.validate_and_normalize().map_err(Into::into)
}

fn set_if_present<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// Boolean env var had an invalid value.
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_env_var"),
            Self::InvalidBool { .. } => ErrorCode::new("config", "invalid_env_bool"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } => write!(formatter, "{var} must be non-empty"),
            Self::InvalidBool { var, .. } => write!(formatter, "{var} must be a boolean"),
            Self::InvalidInt { var, .. } => {
                write!(formatter, "{var} must be a non-negative integer")
            },
            Self::InvalidEnum { var, .. } => write!(formatter, "{var} has an unsupported value"),
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } => envelope.with_metadata("env_var", var),
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", value),
        }
    }
}

fn non_empty<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<&'a str>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some(trimmed))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some(trimmed) = non_empty(map, var)? else {
        return Ok(None);
    };
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: trimmed.to_owned(),
        })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some(trimmed) = non_empty(map, var)? else {
        return Ok(None);
    };
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: trimmed.to_owned(),
        })
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some(trimmed) = non_empty(map, var)? else {
        return Ok(None);
    };
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: trimmed.to_owned(),
        }),
    }
}

fn parse_optional_merge_policy(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<MergePolicy>, EnvParseError> {
    let Some(trimmed) = non_empty(map, var)? else {
        return Ok(None);
    };
    trimmed
        .parse::<MergePolicy>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidEnum {
            var,
            value: trimmed.to_owned(),
        })
}
