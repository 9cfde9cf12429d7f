//! Logger and telemetry adapters writing through a shared sink.

use serde_json::Value;
use std::sync::Arc;
use telemetry_probe_adapters::{JsonLogger, JsonTelemetry, MemoryLogSink};
use telemetry_probe_ports::{LogFields, LogLevel, LoggerPort, TelemetryPort, telemetry_tags};

#[test]
fn logger_and_telemetry_share_one_sink() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(MemoryLogSink::new());
    let logger = JsonLogger::new(sink.clone())
        .with_min_level(LogLevel::Debug)
        .with_base_fields(LogFields::from([(Box::from("suite"), Value::from("rpc"))]));
    let telemetry = JsonTelemetry::new(sink.clone());

    logger.info("probe.poll.start", "Poll run started", None);
    telemetry.increment_counter(
        "probe.poll.cycles",
        1,
        Some(&telemetry_tags([("policy", "append")])),
    );

    let lines: Vec<Value> = sink
        .take()
        .iter()
        .map(|line| serde_json::from_str(line.trim()))
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].get("event"), Some(&Value::from("probe.poll.start")));
    assert_eq!(lines[0].pointer("/fields/suite"), Some(&Value::from("rpc")));
    assert_eq!(lines[1].get("type"), Some(&Value::from("metric")));
    assert_eq!(lines[1].pointer("/tags/policy"), Some(&Value::from("append")));
    Ok(())
}
