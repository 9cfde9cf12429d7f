//! Snapshots and the accumulated view merged across polls.

use crate::metrics::{DataPoint, InstrumentName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Data points observed in a single poll, grouped by instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    instruments: BTreeMap<InstrumentName, Vec<DataPoint>>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            instruments: BTreeMap::new(),
        }
    }

    /// Append points for an instrument, keeping any already recorded.
    #[must_use]
    pub fn with_points(
        mut self,
        name: InstrumentName,
        points: impl IntoIterator<Item = DataPoint>,
    ) -> Self {
        self.extend(name, points);
        self
    }

    /// Append a single point for an instrument.
    pub fn push(&mut self, name: InstrumentName, point: DataPoint) {
        self.instruments.entry(name).or_default().push(point);
    }

    /// Append points for an instrument.
    pub fn extend(&mut self, name: InstrumentName, points: impl IntoIterator<Item = DataPoint>) {
        self.instruments.entry(name).or_default().extend(points);
    }

    /// Points reported for `name`, empty when the instrument is absent.
    #[must_use]
    pub fn points(&self, name: &str) -> &[DataPoint] {
        points_for(&self.instruments, name)
    }

    /// Number of instruments in the snapshot.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    /// Total number of points across all instruments.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.instruments.values().map(Vec::len).sum()
    }

    /// Returns true when no instrument reported anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Keep only instruments named in `allowed`.
    #[must_use]
    pub fn filtered(mut self, allowed: &BTreeSet<InstrumentName>) -> Self {
        self.instruments.retain(|name, _| allowed.contains(name));
        self
    }

    /// Iterate instruments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentName, &[DataPoint])> {
        self.instruments
            .iter()
            .map(|(name, points)| (name, points.as_slice()))
    }
}

impl IntoIterator for Snapshot {
    type Item = (InstrumentName, Vec<DataPoint>);
    type IntoIter = std::collections::btree_map::IntoIter<InstrumentName, Vec<DataPoint>>;

    fn into_iter(self) -> Self::IntoIter {
        self.instruments.into_iter()
    }
}

impl FromIterator<(InstrumentName, Vec<DataPoint>)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (InstrumentName, Vec<DataPoint>)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (name, points) in iter {
            snapshot.extend(name, points);
        }
        snapshot
    }
}

/// How a new snapshot is folded into the accumulated view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Append every observed point. Suits delta-temporality readers, which
    /// report only what changed since the previous collect.
    #[default]
    Append,
    /// Replace the sequence of each instrument present in the snapshot. Suits
    /// cumulative readers, which re-report every point on each collect.
    /// Instruments missing from the snapshot are kept.
    Replace,
}

impl MergePolicy {
    /// Lowercase name used in config files and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Unknown merge policy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMergePolicy(pub String);

impl fmt::Display for UnknownMergePolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "unknown merge policy `{}` (expected `append` or `replace`)",
            self.0
        )
    }
}

impl std::error::Error for UnknownMergePolicy {}

impl FromStr for MergePolicy {
    type Err = UnknownMergePolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            _ => Err(UnknownMergePolicy(value.to_string())),
        }
    }
}

/// Data points merged across every poll of a run.
///
/// Only [`AccumulatedResult::merge`] mutates it; once a run hands it out it
/// is read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccumulatedResult {
    instruments: BTreeMap<InstrumentName, Vec<DataPoint>>,
}

impl AccumulatedResult {
    /// Create an empty result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            instruments: BTreeMap::new(),
        }
    }

    /// Fold `snapshot` into this result.
    ///
    /// Never fails. An empty snapshot leaves the result unchanged under
    /// either policy.
    pub fn merge(&mut self, snapshot: Snapshot, policy: MergePolicy) {
        for (name, points) in snapshot {
            match policy {
                MergePolicy::Append => self.instruments.entry(name).or_default().extend(points),
                MergePolicy::Replace => {
                    self.instruments.insert(name, points);
                },
            }
        }
    }

    /// Points accumulated for `name`, empty when the instrument is absent.
    #[must_use]
    pub fn points(&self, name: &str) -> &[DataPoint] {
        points_for(&self.instruments, name)
    }

    /// Number of points accumulated for `name`.
    #[must_use]
    pub fn point_count(&self, name: &str) -> usize {
        self.points(name).len()
    }

    /// Total number of points across all instruments.
    #[must_use]
    pub fn total_points(&self) -> usize {
        self.instruments.values().map(Vec::len).sum()
    }

    /// Returns true when `name` has an entry (possibly with zero points).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.instruments.contains_key(name)
    }

    /// Number of instruments seen so far.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    /// Returns true when nothing has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Instrument names in sorted order.
    pub fn instrument_names(&self) -> impl Iterator<Item = &InstrumentName> {
        self.instruments.keys()
    }

    /// Iterate instruments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentName, &[DataPoint])> {
        self.instruments
            .iter()
            .map(|(name, points)| (name, points.as_slice()))
    }

    /// Consume into the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<InstrumentName, Vec<DataPoint>> {
        self.instruments
    }
}

/// Pure form of [`AccumulatedResult::merge`].
#[must_use]
pub fn merge(
    mut accumulated: AccumulatedResult,
    snapshot: Snapshot,
    policy: MergePolicy,
) -> AccumulatedResult {
    accumulated.merge(snapshot, policy);
    accumulated
}

fn points_for<'a>(map: &'a BTreeMap<InstrumentName, Vec<DataPoint>>, name: &str) -> &'a [DataPoint] {
    map.get(name).map_or(&[], Vec::as_slice)
}
