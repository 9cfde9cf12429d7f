//! Snapshot source over the OpenTelemetry metrics SDK.
//!
//! Instruments created from [`OtelSnapshotSource::meter`] record into an
//! `SdkMeterProvider` whose only reader pushes into an
//! `InMemoryMetricExporter`. A flush asks the provider to export now; a
//! collect converts everything exported since the previous collect into a
//! [`Snapshot`] and clears the exporter.
//!
//! Sums, gauges and explicit-bucket histograms are converted. Exponential
//! histograms are skipped.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_sdk::metrics::data::{self, Metric};
use opentelemetry_sdk::metrics::{
    InMemoryMetricExporter, InMemoryMetricExporterBuilder, PeriodicReader, SdkMeterProvider,
    Temporality,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use telemetry_probe_domain::{DataPoint, HistogramPoint, InstrumentName, Number, PointValue, Snapshot};
use telemetry_probe_ports::SnapshotSource;
use telemetry_probe_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};

/// Export interval of the periodic reader. Long enough that only forced
/// flushes publish during a poll run.
const READER_INTERVAL: Duration = Duration::from_secs(3600);

/// [`SnapshotSource`] backed by a real `SdkMeterProvider`.
pub struct OtelSnapshotSource {
    provider: SdkMeterProvider,
    exporter: InMemoryMetricExporter,
    // Serializes flush against collect so an export cannot land between
    // reading the exporter and clearing it.
    exchange: Mutex<()>,
}

impl OtelSnapshotSource {
    /// Build a provider exporting with `temporality`.
    ///
    /// With [`Temporality::Delta`] each collect reports what was recorded
    /// since the previous flush. With [`Temporality::Cumulative`] it reports
    /// running totals.
    #[must_use]
    pub fn new(temporality: Temporality) -> Self {
        let exporter = InMemoryMetricExporterBuilder::new()
            .with_temporality(temporality)
            .build();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(READER_INTERVAL)
            .build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        Self {
            provider,
            exporter,
            exchange: Mutex::new(()),
        }
    }

    /// Meter for creating instruments that this source observes.
    #[must_use]
    pub fn meter(&self, scope: &'static str) -> Meter {
        self.provider.meter(scope)
    }

    /// The underlying provider, for code that takes one directly.
    #[must_use]
    pub const fn provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Shut the provider down. Later flushes fail.
    pub fn shutdown(&self) -> Result<()> {
        let _exchange = self.lock();
        self.provider.shutdown().map_err(|error| {
            sdk_error(ErrorCode::flush_failed(), "shutdown", error.to_string())
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OtelSnapshotSource {
    fn default() -> Self {
        Self::new(Temporality::Delta)
    }
}

impl std::fmt::Debug for OtelSnapshotSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OtelSnapshotSource")
            .finish_non_exhaustive()
    }
}

impl SnapshotSource for OtelSnapshotSource {
    /// The SDK flush has no deadline of its own and exports synchronously, so
    /// a successful flush is always complete.
    fn force_flush(&self, deadline: Duration) -> Result<bool> {
        let _exchange = self.lock();
        self.provider.force_flush().map_err(|error| {
            sdk_error(ErrorCode::flush_failed(), "force_flush", error.to_string())
        })?;
        tracing::debug!(
            deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            "opentelemetry provider flushed"
        );
        Ok(true)
    }

    fn collect_snapshot(&self) -> Result<Snapshot> {
        let _exchange = self.lock();
        let exported = self.exporter.get_finished_metrics().map_err(|error| {
            sdk_error(
                ErrorCode::collect_failed(),
                "collect_snapshot",
                error.to_string(),
            )
        })?;
        self.exporter.reset();

        let mut snapshot = Snapshot::new();
        for resource in &exported {
            for scope in &resource.scope_metrics {
                for metric in &scope.metrics {
                    let points = data_points(metric)?;
                    if !points.is_empty() {
                        snapshot.extend(InstrumentName::parse(&*metric.name)?, points);
                    }
                }
            }
        }
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        "opentelemetry"
    }
}

fn sdk_error(code: ErrorCode, operation: &str, message: String) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(code, message, ErrorClass::NonRetriable)
        .with_metadata("operation", operation)
        .with_metadata("source", "opentelemetry")
}

/// Measurement types the SDK aggregates.
trait Measurement: Copy + 'static {
    fn to_number(self) -> Number;

    fn to_f64(self) -> f64 {
        self.to_number().as_f64()
    }
}

impl Measurement for u64 {
    fn to_number(self) -> Number {
        Number::Int(i64::try_from(self).unwrap_or(i64::MAX))
    }
}

impl Measurement for i64 {
    fn to_number(self) -> Number {
        Number::Int(self)
    }
}

impl Measurement for f64 {
    fn to_number(self) -> Number {
        Number::Double(self)
    }
}

fn data_points(metric: &Metric) -> Result<Vec<DataPoint>> {
    let data = metric.data.as_any();

    if let Some(sum) = data.downcast_ref::<data::Sum<u64>>() {
        return Ok(sum_points(sum));
    }
    if let Some(sum) = data.downcast_ref::<data::Sum<i64>>() {
        return Ok(sum_points(sum));
    }
    if let Some(sum) = data.downcast_ref::<data::Sum<f64>>() {
        return Ok(sum_points(sum));
    }
    if let Some(gauge) = data.downcast_ref::<data::Gauge<u64>>() {
        return Ok(gauge_points(gauge));
    }
    if let Some(gauge) = data.downcast_ref::<data::Gauge<i64>>() {
        return Ok(gauge_points(gauge));
    }
    if let Some(gauge) = data.downcast_ref::<data::Gauge<f64>>() {
        return Ok(gauge_points(gauge));
    }
    if let Some(histogram) = data.downcast_ref::<data::Histogram<u64>>() {
        return histogram_points(histogram);
    }
    if let Some(histogram) = data.downcast_ref::<data::Histogram<i64>>() {
        return histogram_points(histogram);
    }
    if let Some(histogram) = data.downcast_ref::<data::Histogram<f64>>() {
        return histogram_points(histogram);
    }

    tracing::debug!(instrument = %metric.name, "skipping unsupported aggregation");
    Ok(Vec::new())
}

fn sum_points<T: Measurement>(sum: &data::Sum<T>) -> Vec<DataPoint> {
    let start = unix_nanos(sum.start_time);
    let time = unix_nanos(sum.time);
    sum.data_points
        .iter()
        .map(|point| {
            let value = PointValue::Sum {
                monotonic: sum.is_monotonic,
                value: point.value.to_number(),
            };
            attributed(DataPoint::new(value), &point.attributes).with_times(start, time)
        })
        .collect()
}

fn gauge_points<T: Measurement>(gauge: &data::Gauge<T>) -> Vec<DataPoint> {
    let start = gauge.start_time.map_or(0, unix_nanos);
    let time = unix_nanos(gauge.time);
    gauge
        .data_points
        .iter()
        .map(|point| {
            let value = PointValue::Gauge {
                value: point.value.to_number(),
            };
            attributed(DataPoint::new(value), &point.attributes).with_times(start, time)
        })
        .collect()
}

fn histogram_points<T: Measurement>(histogram: &data::Histogram<T>) -> Result<Vec<DataPoint>> {
    let start = unix_nanos(histogram.start_time);
    let time = unix_nanos(histogram.time);
    histogram
        .data_points
        .iter()
        .map(|point| {
            let mut value = HistogramPoint::new(
                point.count,
                point.sum.to_f64(),
                point.bounds.clone(),
                point.bucket_counts.clone(),
            )?;
            if let (Some(min), Some(max)) = (point.min, point.max) {
                value = value.with_min_max(min.to_f64(), max.to_f64());
            }
            Ok(
                attributed(DataPoint::new(PointValue::Histogram(value)), &point.attributes)
                    .with_times(start, time),
            )
        })
        .collect()
}

fn attributed(point: DataPoint, attributes: &[KeyValue]) -> DataPoint {
    attributes.iter().fold(point, |point, attribute| {
        point.with_attribute(attribute.key.as_str(), attribute.value.as_str())
    })
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| u64::try_from(elapsed.as_nanos()).ok())
        .unwrap_or_default()
}
