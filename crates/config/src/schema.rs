//! Probe configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Normalization trims, sorts and dedupes the instrument allow-list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use telemetry_probe_domain::{InstrumentName, MergePolicy};
use telemetry_probe_shared::{BoundedU32, BoundedU64, ErrorCode, ErrorEnvelope};

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Smallest poll budget.
pub const POLL_MAX_ITERATIONS_MIN: u32 = 1;
/// Largest poll budget.
pub const POLL_MAX_ITERATIONS_MAX: u32 = 10_000;
const POLL_MAX_ITERATIONS_DEFAULT: u32 = 5;

/// Shortest inter-poll delay (ms).
pub const INTERVAL_MIN_MS: u64 = 1;
/// Longest inter-poll delay (ms).
pub const INTERVAL_MAX_MS: u64 = 600_000;
const INTERVAL_DEFAULT_MS: u64 = 1_000;

const FLUSH_TIMEOUT_MIN_MS: u64 = 1;
const FLUSH_TIMEOUT_MAX_MS: u64 = 600_000;
const FLUSH_TIMEOUT_DEFAULT_MS: u64 = 5_000;

/// Smallest collector budget.
pub const COLLECTOR_ITERATIONS_MIN: u32 = 1;
/// Largest collector budget.
pub const COLLECTOR_ITERATIONS_MAX: u32 = 100_000;
const COLLECTOR_ITERATIONS_DEFAULT: u32 = 10;

const INSTRUMENTS_MAX: usize = 1_024;

/// Validated poll budget.
pub type PollIterations = BoundedU32<POLL_MAX_ITERATIONS_MIN, POLL_MAX_ITERATIONS_MAX>;
/// Validated collector budget.
pub type CollectorIterations = BoundedU32<COLLECTOR_ITERATIONS_MIN, COLLECTOR_ITERATIONS_MAX>;
/// Validated inter-poll delay in milliseconds.
pub type IntervalMs = BoundedU64<INTERVAL_MIN_MS, INTERVAL_MAX_MS>;
/// Validated flush deadline in milliseconds.
pub type FlushTimeoutMs = BoundedU64<FLUSH_TIMEOUT_MIN_MS, FLUSH_TIMEOUT_MAX_MS>;

/// Top-level probe configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProbeConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Synchronous poller settings (also the shared cycle settings).
    pub poll: PollConfig,
    /// Background collector settings.
    pub collector: CollectorConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            poll: PollConfig::default(),
            collector: CollectorConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedProbeConfig, ConfigSchemaError> {
        self.validate_version()?;
        self.poll.normalize();
        let instruments = self.poll.instrument_set()?;

        let limits = ProbeLimits::new(&self)?;
        Ok(ValidatedProbeConfig {
            raw: self,
            limits,
            instruments,
        })
    }

    const fn validate_version(&self) -> Result<(), ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        Ok(())
    }
}

/// Poll cycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PollConfig {
    /// Upper bound on poll cycles.
    pub max_iterations: u32,
    /// Delay between cycles (ms).
    pub interval_ms: u64,
    /// Deadline handed to `force_flush` (ms).
    pub flush_timeout_ms: u64,
    /// How snapshots are folded together.
    pub merge_policy: MergePolicy,
    /// Optional allow-list; other instruments are dropped before merging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruments: Option<Vec<Box<str>>>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_iterations: POLL_MAX_ITERATIONS_DEFAULT,
            interval_ms: INTERVAL_DEFAULT_MS,
            flush_timeout_ms: FLUSH_TIMEOUT_DEFAULT_MS,
            merge_policy: MergePolicy::Append,
            instruments: None,
        }
    }
}

impl PollConfig {
    fn normalize(&mut self) {
        if let Some(instruments) = self.instruments.as_mut() {
            let normalized: BTreeSet<Box<str>> = instruments
                .iter()
                .map(|name| name.trim().to_owned().into_boxed_str())
                .collect();
            *instruments = normalized.into_iter().collect();
        }
    }

    fn instrument_set(&self) -> Result<Option<BTreeSet<InstrumentName>>, ConfigSchemaError> {
        let Some(instruments) = self.instruments.as_ref() else {
            return Ok(None);
        };
        if instruments.len() > INSTRUMENTS_MAX {
            return Err(ConfigSchemaError::ListTooLarge {
                section: "poll",
                field: "instruments",
                len: instruments.len(),
                max: INSTRUMENTS_MAX,
            });
        }
        instruments
            .iter()
            .map(|name| {
                InstrumentName::parse(name).map_err(|_| ConfigSchemaError::InvalidInstrument {
                    section: "poll",
                    field: "instruments",
                    input: name.to_string(),
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Some)
    }
}

/// Background collector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CollectorConfig {
    /// Upper bound on collection cycles.
    pub iterations: u32,
    /// Delay before each cycle (ms).
    pub interval_ms: u64,
    /// End the worker as soon as the predicate holds.
    pub stop_on_convergence: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            iterations: COLLECTOR_ITERATIONS_DEFAULT,
            interval_ms: INTERVAL_DEFAULT_MS,
            stop_on_convergence: false,
        }
    }
}

/// Validated config wrapper carrying bounded numeric values.
#[derive(Debug, Clone)]
pub struct ValidatedProbeConfig {
    raw: ProbeConfig,
    limits: ProbeLimits,
    instruments: Option<BTreeSet<InstrumentName>>,
}

impl ValidatedProbeConfig {
    /// Access validated numeric bounds.
    #[must_use]
    pub const fn limits(&self) -> &ProbeLimits {
        &self.limits
    }

    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &ProbeConfig {
        &self.raw
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> ProbeConfig {
        self.raw
    }

    /// Settings for `poll_until` / `poll_until_async`.
    #[must_use]
    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            max_iterations: self.limits.poll_max_iterations,
            interval: self.limits.poll_interval_ms.as_duration_ms(),
            flush_timeout: self.limits.flush_timeout_ms.as_duration_ms(),
            merge_policy: self.raw.poll.merge_policy,
            instruments: self.instruments.clone(),
        }
    }

    /// Settings for `MetricsCollector::start`.
    #[must_use]
    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            iterations: self.limits.collector_iterations,
            interval: self.limits.collector_interval_ms.as_duration_ms(),
            flush_timeout: self.limits.flush_timeout_ms.as_duration_ms(),
            merge_policy: self.raw.poll.merge_policy,
            instruments: self.instruments.clone(),
            stop_on_convergence: self.raw.collector.stop_on_convergence,
        }
    }
}

impl AsRef<ProbeConfig> for ValidatedProbeConfig {
    fn as_ref(&self) -> &ProbeConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedProbeConfig {
    type Target = ProbeConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Validated numeric limits derived from the config.
#[derive(Debug, Clone, Copy)]
pub struct ProbeLimits {
    /// Poll budget.
    pub poll_max_iterations: PollIterations,
    /// Poll delay (ms).
    pub poll_interval_ms: IntervalMs,
    /// Flush deadline (ms).
    pub flush_timeout_ms: FlushTimeoutMs,
    /// Collector budget.
    pub collector_iterations: CollectorIterations,
    /// Collector delay (ms).
    pub collector_interval_ms: IntervalMs,
}

impl ProbeLimits {
    fn new(config: &ProbeConfig) -> Result<Self, ConfigSchemaError> {
        Ok(Self {
            poll_max_iterations: bounded_u32(
                "poll",
                "maxIterations",
                config.poll.max_iterations,
                POLL_MAX_ITERATIONS_MIN,
                POLL_MAX_ITERATIONS_MAX,
            )?,
            poll_interval_ms: bounded_interval(
                "poll",
                "intervalMs",
                config.poll.interval_ms,
                INTERVAL_MIN_MS,
                INTERVAL_MAX_MS,
            )?,
            flush_timeout_ms: bounded_interval(
                "poll",
                "flushTimeoutMs",
                config.poll.flush_timeout_ms,
                FLUSH_TIMEOUT_MIN_MS,
                FLUSH_TIMEOUT_MAX_MS,
            )?,
            collector_iterations: bounded_u32(
                "collector",
                "iterations",
                config.collector.iterations,
                COLLECTOR_ITERATIONS_MIN,
                COLLECTOR_ITERATIONS_MAX,
            )?,
            collector_interval_ms: bounded_interval(
                "collector",
                "intervalMs",
                config.collector.interval_ms,
                INTERVAL_MIN_MS,
                INTERVAL_MAX_MS,
            )?,
        })
    }
}

/// Runtime settings for a synchronous or async poll run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    max_iterations: PollIterations,
    interval: Duration,
    flush_timeout: Duration,
    merge_policy: MergePolicy,
    instruments: Option<BTreeSet<InstrumentName>>,
}

impl PollerSettings {
    /// Build settings programmatically, with the same bounds as config files.
    ///
    /// A zero budget or a sub-millisecond interval is rejected here, before
    /// any poll runs.
    pub fn new(max_iterations: u32, interval: Duration) -> Result<Self, ConfigSchemaError> {
        let defaults = PollConfig::default();
        Ok(Self {
            max_iterations: bounded_u32(
                "poll",
                "maxIterations",
                max_iterations,
                POLL_MAX_ITERATIONS_MIN,
                POLL_MAX_ITERATIONS_MAX,
            )?,
            interval: bounded_duration("poll", "intervalMs", interval, INTERVAL_MIN_MS, INTERVAL_MAX_MS)?,
            flush_timeout: Duration::from_millis(defaults.flush_timeout_ms),
            merge_policy: defaults.merge_policy,
            instruments: None,
        })
    }

    /// Override the flush deadline.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Result<Self, ConfigSchemaError> {
        self.flush_timeout = bounded_duration(
            "poll",
            "flushTimeoutMs",
            flush_timeout,
            FLUSH_TIMEOUT_MIN_MS,
            FLUSH_TIMEOUT_MAX_MS,
        )?;
        Ok(self)
    }

    /// Override the merge policy.
    #[must_use]
    pub const fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    /// Restrict polling to the named instruments.
    pub fn with_instruments<I, S>(mut self, names: I) -> Result<Self, ConfigSchemaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.instruments = Some(parse_instruments("poll", names)?);
        Ok(self)
    }

    /// Poll budget.
    #[must_use]
    pub const fn max_iterations(&self) -> u32 {
        self.max_iterations.get()
    }

    /// Delay between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline handed to the source on each flush.
    #[must_use]
    pub const fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    /// Merge policy.
    #[must_use]
    pub const fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Instrument allow-list, when configured.
    #[must_use]
    pub const fn instruments(&self) -> Option<&BTreeSet<InstrumentName>> {
        self.instruments.as_ref()
    }
}

/// Runtime settings for a background collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    iterations: CollectorIterations,
    interval: Duration,
    flush_timeout: Duration,
    merge_policy: MergePolicy,
    instruments: Option<BTreeSet<InstrumentName>>,
    stop_on_convergence: bool,
}

impl CollectorSettings {
    /// Build settings programmatically, with the same bounds as config files.
    pub fn new(iterations: u32, interval: Duration) -> Result<Self, ConfigSchemaError> {
        let defaults = PollConfig::default();
        Ok(Self {
            iterations: bounded_u32(
                "collector",
                "iterations",
                iterations,
                COLLECTOR_ITERATIONS_MIN,
                COLLECTOR_ITERATIONS_MAX,
            )?,
            interval: bounded_duration(
                "collector",
                "intervalMs",
                interval,
                INTERVAL_MIN_MS,
                INTERVAL_MAX_MS,
            )?,
            flush_timeout: Duration::from_millis(defaults.flush_timeout_ms),
            merge_policy: defaults.merge_policy,
            instruments: None,
            stop_on_convergence: false,
        })
    }

    /// Override the flush deadline.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Result<Self, ConfigSchemaError> {
        self.flush_timeout = bounded_duration(
            "collector",
            "flushTimeoutMs",
            flush_timeout,
            FLUSH_TIMEOUT_MIN_MS,
            FLUSH_TIMEOUT_MAX_MS,
        )?;
        Ok(self)
    }

    /// Override the merge policy.
    #[must_use]
    pub const fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    /// Restrict collection to the named instruments.
    pub fn with_instruments<I, S>(mut self, names: I) -> Result<Self, ConfigSchemaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.instruments = Some(parse_instruments("collector", names)?);
        Ok(self)
    }

    /// End the worker early once the predicate holds.
    #[must_use]
    pub const fn with_stop_on_convergence(mut self, stop_on_convergence: bool) -> Self {
        self.stop_on_convergence = stop_on_convergence;
        self
    }

    /// Collection budget.
    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Delay before each cycle.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline handed to the source on each flush.
    #[must_use]
    pub const fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    /// Merge policy.
    #[must_use]
    pub const fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Instrument allow-list, when configured.
    #[must_use]
    pub const fn instruments(&self) -> Option<&BTreeSet<InstrumentName>> {
        self.instruments.as_ref()
    }

    /// Whether convergence ends the worker early.
    #[must_use]
    pub const fn stop_on_convergence(&self) -> bool {
        self.stop_on_convergence
    }
}

/// Parse and validate JSON config input.
pub fn parse_probe_config_json(input: &str) -> Result<ValidatedProbeConfig, ErrorEnvelope> {
    let config: ProbeConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Parse and validate TOML config input.
pub fn parse_probe_config_toml(input: &str) -> Result<ValidatedProbeConfig, ErrorEnvelope> {
    let config: ProbeConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Validation failures for probe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this crate.
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A delay or deadline is out of bounds.
    IntervalOutOfRange {
        /// Schema section (e.g. `poll`).
        section: &'static str,
        /// Field name in the config file (e.g. `intervalMs`).
        field: &'static str,
        /// Value provided (ms).
        value_ms: u64,
        /// Minimum allowed value (ms).
        min_ms: u64,
        /// Maximum allowed value (ms).
        max_ms: u64,
    },
    /// An iteration budget is out of bounds.
    LimitOutOfRange {
        /// Schema section (e.g. `collector`).
        section: &'static str,
        /// Field name in the config file (e.g. `iterations`).
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// A list field exceeds the maximum allowed size.
    ListTooLarge {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Number of entries after deduplication.
        len: usize,
        /// Maximum allowed number of entries.
        max: usize,
    },
    /// An instrument allow-list entry is empty.
    InvalidInstrument {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Offending entry.
        input: String,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::IntervalOutOfRange { .. } => ErrorCode::new("config", "invalid_interval"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::ListTooLarge { .. } => ErrorCode::new("config", "list_too_large"),
            Self::InvalidInstrument { .. } => ErrorCode::new("config", "invalid_instrument"),
        }
    }
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => {
                write!(
                    formatter,
                    "unsupported config version: {found} (supported: {supported})"
                )
            },
            Self::IntervalOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min_ms}, {max_ms}] ms (got {value_ms})"
            ),
            Self::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min}, {max}] (got {value})"
            ),
            Self::ListTooLarge {
                section,
                field,
                len,
                max,
            } => write!(
                formatter,
                "{section}.{field} has too many entries ({len}, max {max})"
            ),
            Self::InvalidInstrument { section, field, .. } => {
                write!(formatter, "{section}.{field} entries must be non-empty")
            },
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::IntervalOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value_ms", value_ms.to_string())
                .with_metadata("min_ms", min_ms.to_string())
                .with_metadata("max_ms", max_ms.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::ListTooLarge {
                section,
                field,
                len,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::InvalidInstrument {
                section,
                field,
                input,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("input", input),
        }
    }
}

fn parse_instruments<I, S>(
    section: &'static str,
    names: I,
) -> Result<BTreeSet<InstrumentName>, ConfigSchemaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed = names
        .into_iter()
        .map(|name| {
            InstrumentName::parse(name.as_ref()).map_err(|_| ConfigSchemaError::InvalidInstrument {
                section,
                field: "instruments",
                input: name.as_ref().to_owned(),
            })
        })
        .collect::<Result<BTreeSet<_>, _>>()?;
    if parsed.len() > INSTRUMENTS_MAX {
        return Err(ConfigSchemaError::ListTooLarge {
            section,
            field: "instruments",
            len: parsed.len(),
            max: INSTRUMENTS_MAX,
        });
    }
    Ok(parsed)
}

fn bounded_u32<const MIN: u32, const MAX: u32>(
    section: &'static str,
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<BoundedU32<MIN, MAX>, ConfigSchemaError> {
    BoundedU32::try_new(value).map_err(|_| ConfigSchemaError::LimitOutOfRange {
        section,
        field,
        value: u64::from(value),
        min: u64::from(min),
        max: u64::from(max),
    })
}

fn bounded_interval<const MIN: u64, const MAX: u64>(
    section: &'static str,
    field: &'static str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<BoundedU64<MIN, MAX>, ConfigSchemaError> {
    BoundedU64::try_new(value_ms).map_err(|_| ConfigSchemaError::IntervalOutOfRange {
        section,
        field,
        value_ms,
        min_ms,
        max_ms,
    })
}

fn bounded_duration(
    section: &'static str,
    field: &'static str,
    value: Duration,
    min_ms: u64,
    max_ms: u64,
) -> Result<Duration, ConfigSchemaError> {
    let value_ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigSchemaError::IntervalOutOfRange {
            section,
            field,
            value_ms,
            min_ms,
            max_ms,
        });
    }
    Ok(value)
}
