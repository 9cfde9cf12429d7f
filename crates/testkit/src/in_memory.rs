//! In-memory logger and telemetry implementations for port contracts.
//!
//! The recording variants keep every event so tests can assert on what a
//! poll run reported.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use telemetry_probe_ports::{
    LogEvent, LogFields, LogLevel, LoggerPort, TelemetryPort, TelemetryTags, TelemetryTimer,
};

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// A no-op telemetry timer.
#[derive(Debug, Default)]
pub struct NoopTimer;

impl TelemetryTimer for NoopTimer {
    fn stop(&self) {}
}

/// A no-op telemetry implementation.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetryPort for NoopTelemetry {
    fn increment_counter(&self, _name: &str, _value: u64, _tags: Option<&TelemetryTags>) {}

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}

    fn start_timer(&self, _name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(NoopTimer)
    }
}

/// Logger that keeps every event in memory.
///
/// Children share the parent's buffer and merge their base fields into each
/// event.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base_fields: LogFields,
}

impl RecordingLogger {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, in emission order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().expect("events lock").clone()
    }

    /// Event names in emission order.
    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| event.event.to_string())
            .collect()
    }

    /// Events with the given name.
    pub fn events_named(&self, name: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|event| &*event.event == name)
            .collect()
    }

    /// Events at the given level.
    pub fn events_at(&self, level: LogLevel) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }

    /// Field `key` of the first event named `name`.
    pub fn field(&self, name: &str, key: &str) -> Option<Value> {
        self.events_named(name)
            .first()
            .and_then(|event| event.fields.as_ref())
            .and_then(|fields| fields.get(key).cloned())
    }
}

impl LoggerPort for RecordingLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base_fields.is_empty() {
            let mut fields = self.base_fields.clone();
            if let Some(extra) = event.fields.take() {
                fields.extend(extra);
            }
            event.fields = Some(fields);
        }
        self.events.lock().expect("events lock").push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base_fields,
        })
    }
}

/// One recorded timer sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSample {
    /// Timer name.
    pub name: String,
    /// Recorded duration.
    pub duration_ms: u64,
    /// Tags attached when the timer was started.
    pub tags: Option<TelemetryTags>,
}

#[derive(Debug, Default)]
struct TelemetryLog {
    counters: BTreeMap<String, u64>,
    timers: Vec<TimerSample>,
}

/// Telemetry sink that sums counters and keeps timer samples.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    log: Arc<Mutex<TelemetryLog>>,
}

impl RecordingTelemetry {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all increments recorded for `name` (0 when never incremented).
    pub fn counter(&self, name: &str) -> u64 {
        self.log
            .lock()
            .expect("telemetry lock")
            .counters
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// All counters, keyed by name.
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.log.lock().expect("telemetry lock").counters.clone()
    }

    /// Timer samples recorded for `name`.
    pub fn timers(&self, name: &str) -> Vec<TimerSample> {
        self.log
            .lock()
            .expect("telemetry lock")
            .timers
            .iter()
            .filter(|sample| sample.name == name)
            .cloned()
            .collect()
    }
}

impl TelemetryPort for RecordingTelemetry {
    fn increment_counter(&self, name: &str, value: u64, _tags: Option<&TelemetryTags>) {
        let mut log = self.log.lock().expect("telemetry lock");
        let counter = log.counters.entry(name.to_owned()).or_insert(0);
        *counter = counter.saturating_add(value);
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        self.log
            .lock()
            .expect("telemetry lock")
            .timers
            .push(TimerSample {
                name: name.to_owned(),
                duration_ms,
                tags: tags.cloned(),
            });
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(RecordingTimer {
            telemetry: self.clone(),
            name: name.to_owned(),
            tags: tags.cloned(),
            started_at: std::time::Instant::now(),
        })
    }
}

struct RecordingTimer {
    telemetry: RecordingTelemetry,
    name: String,
    tags: Option<TelemetryTags>,
    started_at: std::time::Instant,
}

impl TelemetryTimer for RecordingTimer {
    fn stop(&self) {
        let elapsed = u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.telemetry
            .record_timer_ms(&self.name, elapsed, self.tags.as_ref());
    }
}
