//! Metric data points as reported by a snapshot source.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use telemetry_probe_shared::{ErrorCode, ErrorEnvelope};

/// Validation failures for metric primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// `InstrumentName` is empty after trimming.
    EmptyInstrumentName {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// Histogram bucket counts do not line up with the boundaries.
    HistogramBucketMismatch {
        /// Number of explicit bucket boundaries.
        boundaries: usize,
        /// Number of bucket counts supplied.
        bucket_counts: usize,
    },
    /// Histogram count disagrees with the sum of its bucket counts.
    HistogramCountMismatch {
        /// Declared total count.
        count: u64,
        /// Sum of the bucket counts.
        bucket_total: u64,
    },
}

impl MetricError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyInstrumentName { .. } => ErrorCode::new("domain", "invalid_instrument_name"),
            Self::HistogramBucketMismatch { .. } | Self::HistogramCountMismatch { .. } => {
                ErrorCode::new("domain", "invalid_histogram")
            },
        }
    }
}

impl fmt::Display for MetricError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInstrumentName { .. } => {
                formatter.write_str("InstrumentName must be non-empty")
            },
            Self::HistogramBucketMismatch { .. } => {
                formatter.write_str("histogram must have exactly one more bucket count than boundaries")
            },
            Self::HistogramCountMismatch { .. } => {
                formatter.write_str("histogram count must equal the sum of its bucket counts")
            },
        }
    }
}

impl std::error::Error for MetricError {}

impl From<MetricError> for ErrorEnvelope {
    fn from(error: MetricError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            MetricError::EmptyInstrumentName { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            MetricError::HistogramBucketMismatch {
                boundaries,
                bucket_counts,
            } => envelope
                .with_metadata("boundaries", boundaries.to_string())
                .with_metadata("bucket_counts", bucket_counts.to_string()),
            MetricError::HistogramCountMismatch {
                count,
                bucket_total,
            } => envelope
                .with_metadata("count", count.to_string())
                .with_metadata("bucket_total", bucket_total.to_string()),
        }
    }
}

/// Name of a metric instrument, e.g. `grpc.client.attempt.duration`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentName(Box<str>);

impl InstrumentName {
    /// Parse an instrument name; surrounding whitespace is trimmed.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, MetricError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MetricError::EmptyInstrumentName {
                input_length: raw.len(),
            });
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for InstrumentName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for InstrumentName {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for InstrumentName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for InstrumentName {
    type Error = MetricError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstrumentName> for String {
    fn from(value: InstrumentName) -> Self {
        value.0.into_string()
    }
}

/// A numeric measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Number {
    /// Integer-valued instrument.
    Int(i64),
    /// Floating-point instrument.
    Double(f64),
}

impl Number {
    /// Lossy conversion used by predicates that compare magnitudes.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "predicates compare magnitudes, not exact integers"
    )]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Double(value) => value,
        }
    }
}

/// Histogram aggregation for one attribute set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramPoint {
    count: u64,
    sum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    boundaries: Vec<f64>,
    bucket_counts: Vec<u64>,
}

impl HistogramPoint {
    /// Build a histogram point.
    ///
    /// `bucket_counts` must have one entry per boundary plus the overflow bucket,
    /// and must add up to `count`.
    pub fn new(
        count: u64,
        sum: f64,
        boundaries: Vec<f64>,
        bucket_counts: Vec<u64>,
    ) -> Result<Self, MetricError> {
        if bucket_counts.len() != boundaries.len() + 1 {
            return Err(MetricError::HistogramBucketMismatch {
                boundaries: boundaries.len(),
                bucket_counts: bucket_counts.len(),
            });
        }
        let bucket_total = bucket_counts
            .iter()
            .fold(0u64, |total, value| total.saturating_add(*value));
        if bucket_total != count {
            return Err(MetricError::HistogramCountMismatch {
                count,
                bucket_total,
            });
        }
        Ok(Self {
            count,
            sum,
            min: None,
            max: None,
            boundaries,
            bucket_counts,
        })
    }

    /// Attach the observed min/max.
    #[must_use]
    pub const fn with_min_max(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Total number of recorded measurements.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Sum of recorded measurements.
    #[must_use]
    pub const fn sum(&self) -> f64 {
        self.sum
    }

    /// Smallest recorded measurement, when reported.
    #[must_use]
    pub const fn min(&self) -> Option<f64> {
        self.min
    }

    /// Largest recorded measurement, when reported.
    #[must_use]
    pub const fn max(&self) -> Option<f64> {
        self.max
    }

    /// Explicit bucket boundaries.
    #[must_use]
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Per-bucket counts, including the overflow bucket.
    #[must_use]
    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }
}

/// Value carried by a data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointValue {
    /// Counter or up-down counter.
    Sum {
        /// Whether the sum only ever increases.
        monotonic: bool,
        /// Aggregated value.
        value: Number,
    },
    /// Last observed value.
    Gauge {
        /// Observed value.
        value: Number,
    },
    /// Bucketed distribution.
    Histogram(HistogramPoint),
}

/// One attributed measurement.
///
/// Data points are immutable once built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    value: PointValue,
    #[serde(default)]
    start_time_unix_nano: u64,
    #[serde(default)]
    time_unix_nano: u64,
}

impl DataPoint {
    /// Create a point with no attributes and zero timestamps.
    #[must_use]
    pub const fn new(value: PointValue) -> Self {
        Self {
            attributes: BTreeMap::new(),
            value,
            start_time_unix_nano: 0,
            time_unix_nano: 0,
        }
    }

    /// Monotonic integer sum, the shape of most RPC counters.
    #[must_use]
    pub const fn counter(value: i64) -> Self {
        Self::new(PointValue::Sum {
            monotonic: true,
            value: Number::Int(value),
        })
    }

    /// Floating-point gauge.
    #[must_use]
    pub const fn gauge(value: f64) -> Self {
        Self::new(PointValue::Gauge {
            value: Number::Double(value),
        })
    }

    /// Attach an identifying attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set start and end timestamps, in nanoseconds since the Unix epoch.
    #[must_use]
    pub const fn with_times(mut self, start_time_unix_nano: u64, time_unix_nano: u64) -> Self {
        self.start_time_unix_nano = start_time_unix_nano;
        self.time_unix_nano = time_unix_nano;
        self
    }

    /// Identifying attributes, ordered by key.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Look up a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Point value.
    #[must_use]
    pub const fn value(&self) -> &PointValue {
        &self.value
    }

    /// Start of the aggregation window.
    #[must_use]
    pub const fn start_time_unix_nano(&self) -> u64 {
        self.start_time_unix_nano
    }

    /// End of the aggregation window.
    #[must_use]
    pub const fn time_unix_nano(&self) -> u64 {
        self.time_unix_nano
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_name_is_trimmed() -> Result<(), MetricError> {
        let name = InstrumentName::parse("  grpc.client.attempt.started ")?;
        assert_eq!(name.as_str(), "grpc.client.attempt.started");
        assert_eq!(
            InstrumentName::parse("   "),
            Err(MetricError::EmptyInstrumentName { input_length: 3 })
        );
        Ok(())
    }

    #[test]
    fn instrument_name_deserialization_validates() {
        let parsed: Result<InstrumentName, _> = serde_json::from_str("\" \"");
        assert!(parsed.is_err());

        let parsed: Result<InstrumentName, _> = serde_json::from_str("\" rpc.count \"");
        assert_eq!(parsed.ok().map(String::from), Some("rpc.count".to_string()));
    }

    #[test]
    fn histogram_requires_overflow_bucket() {
        let error = HistogramPoint::new(3, 6.0, vec![1.0, 5.0], vec![1, 2]).err();
        assert_eq!(
            error,
            Some(MetricError::HistogramBucketMismatch {
                boundaries: 2,
                bucket_counts: 2
            })
        );

        let error = HistogramPoint::new(4, 6.0, vec![1.0], vec![1, 2]).err();
        assert_eq!(
            error,
            Some(MetricError::HistogramCountMismatch {
                count: 4,
                bucket_total: 3
            })
        );
    }

    #[test]
    fn histogram_accessors() -> Result<(), MetricError> {
        let histogram =
            HistogramPoint::new(3, 7.5, vec![1.0, 5.0], vec![0, 2, 1])?.with_min_max(1.5, 4.0);
        assert_eq!(histogram.count(), 3);
        assert_eq!(histogram.bucket_counts(), &[0, 2, 1]);
        assert_eq!(histogram.min(), Some(1.5));
        assert_eq!(histogram.max(), Some(4.0));
        Ok(())
    }

    #[test]
    fn metric_errors_map_into_envelopes() {
        let envelope: ErrorEnvelope = MetricError::HistogramBucketMismatch {
            boundaries: 2,
            bucket_counts: 5,
        }
        .into();
        assert_eq!(envelope.code.to_string(), "domain:invalid_histogram");
        assert_eq!(
            envelope.metadata.get("bucket_counts").map(String::as_str),
            Some("5")
        );
    }

    #[test]
    fn data_point_builder_keeps_attributes_sorted() {
        let point = DataPoint::counter(1)
            .with_attribute("grpc.target", "dns:///localhost")
            .with_attribute("grpc.method", "echo.Echo/Call")
            .with_times(10, 20);

        let keys: Vec<&str> = point.attributes().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["grpc.method", "grpc.target"]);
        assert_eq!(point.attribute("grpc.method"), Some("echo.Echo/Call"));
        assert_eq!(point.time_unix_nano(), 20);
        assert!(matches!(
            point.value(),
            PointValue::Sum {
                monotonic: true,
                value: Number::Int(1)
            }
        ));
    }

    #[test]
    fn number_widens_to_f64() {
        assert!((Number::Int(3).as_f64() - 3.0).abs() < f64::EPSILON);
        assert!((Number::Double(2.5).as_f64() - 2.5).abs() < f64::EPSILON);
    }
}
