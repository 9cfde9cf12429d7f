//! Data point and snapshot builders for tests.

use telemetry_probe_domain::{DataPoint, InstrumentName, Snapshot};

/// Parse an instrument name, panicking on an empty fixture name.
pub fn instrument(name: &str) -> InstrumentName {
    InstrumentName::parse(name).expect("fixture instrument names are non-empty")
}

/// A monotonic counter point tagged with `seq`, so points stay distinguishable.
pub fn counter_point(value: i64, seq: u64) -> DataPoint {
    DataPoint::counter(value)
        .with_attribute("seq", seq.to_string())
        .with_times(seq, seq + 1)
}

/// A gauge point with a single attribute.
pub fn gauge_point(value: f64, key: &str, attr: &str) -> DataPoint {
    DataPoint::gauge(value).with_attribute(key, attr)
}

/// A snapshot holding `points` under `name`.
pub fn snapshot_of(name: &str, points: impl IntoIterator<Item = DataPoint>) -> Snapshot {
    Snapshot::new().with_points(instrument(name), points)
}

/// The two-poll `rpc.count` script: `[dp1]`, then `[dp1, dp2]`.
///
/// Returns the snapshots together with `dp1` and `dp2`.
pub fn rpc_count_script() -> (Vec<Snapshot>, DataPoint, DataPoint) {
    let dp1 = counter_point(1, 1);
    let dp2 = counter_point(2, 2);
    let script = vec![
        snapshot_of("rpc.count", [dp1.clone()]),
        snapshot_of("rpc.count", [dp1.clone(), dp2.clone()]),
    ];
    (script, dp1, dp2)
}
