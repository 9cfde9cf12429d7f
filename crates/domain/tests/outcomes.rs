//! Integration coverage for metric validation and poll outcomes.

use telemetry_probe_domain::{
    AccumulatedResult, DataPoint, InstrumentName, MergePolicy, MetricError, PollFailure,
    PollOutcome, PollReport, PollStatus, Snapshot,
};
use telemetry_probe_shared::{ErrorCode, ErrorEnvelope};

#[test]
fn metric_errors_map_into_error_envelopes() -> Result<(), MetricError> {
    let Err(error) = InstrumentName::parse("  ") else {
        return Err(MetricError::EmptyInstrumentName { input_length: 0 });
    };

    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code.namespace(), "domain");
    assert_eq!(envelope.code.code(), "invalid_instrument_name");
    assert_eq!(envelope.metadata.get("input_length"), Some(&"2".to_string()));
    Ok(())
}

#[test]
fn outcomes_walk_a_budget_of_three() {
    let decided: Vec<PollOutcome> = (1..=3).map(|poll| PollOutcome::decide(false, poll, 3)).collect();
    assert_eq!(
        decided,
        vec![
            PollOutcome::ContinuePolling,
            PollOutcome::ContinuePolling,
            PollOutcome::ExhaustedBudget
        ]
    );
}

#[test]
fn failure_keeps_partial_result() -> Result<(), MetricError> {
    let mut partial = AccumulatedResult::new();
    partial.merge(
        Snapshot::new().with_points(InstrumentName::parse("rpc.count")?, [DataPoint::counter(1)]),
        MergePolicy::Append,
    );

    let failure = PollFailure::new(ErrorEnvelope::cancelled("stop requested"), 1, partial.clone());
    assert!(failure.is_cancelled());
    assert_eq!(failure.polls(), 1);

    let (error, kept) = failure.into_parts();
    assert_eq!(error.code, ErrorCode::cancelled());
    assert_eq!(kept, partial);
    Ok(())
}

#[test]
fn accumulated_result_serializes_by_instrument() -> Result<(), MetricError> {
    let report = PollReport::new(
        PollStatus::Converged,
        1,
        telemetry_probe_domain::merge(
            AccumulatedResult::new(),
            Snapshot::new().with_points(
                InstrumentName::parse("rpc.count")?,
                [DataPoint::counter(3).with_attribute("grpc.method", "echo")],
            ),
            MergePolicy::Append,
        ),
    );

    let json = serde_json::to_value(report.result()).unwrap_or_default();
    assert_eq!(
        json.pointer("/rpc.count/0/attributes/grpc.method")
            .and_then(serde_json::Value::as_str),
        Some("echo")
    );
    assert_eq!(
        json.pointer("/rpc.count/0/value/type")
            .and_then(serde_json::Value::as_str),
        Some("sum")
    );
    Ok(())
}
