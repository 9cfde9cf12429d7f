//! Ready-made convergence predicates.
//!
//! Every helper returns a [`Predicate`] that is `true` once the accumulated
//! view is complete enough to assert on.

use std::sync::Arc;
use telemetry_probe_domain::AccumulatedResult;
use telemetry_probe_ports::Predicate;

/// Wrap a closure as a [`Predicate`].
pub fn predicate<F>(check: F) -> Predicate
where
    F: Fn(&AccumulatedResult) -> bool + Send + Sync + 'static,
{
    Arc::new(check)
}

/// Holds once `name` has accumulated at least `min` points.
pub fn min_points(name: impl Into<String>, min: usize) -> Predicate {
    let name = name.into();
    predicate(move |view| view.point_count(&name) >= min)
}

/// Holds once every instrument in `names` has reported at least one point.
pub fn has_instruments<I, S>(names: I) -> Predicate
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    predicate(move |view| names.iter().all(|name| view.point_count(name) > 0))
}

/// Holds once `name` has at least `min` points whose attribute `key` equals
/// `value`.
pub fn points_matching(
    name: impl Into<String>,
    key: impl Into<String>,
    value: impl Into<String>,
    min: usize,
) -> Predicate {
    let name = name.into();
    let key = key.into();
    let value = value.into();
    predicate(move |view| {
        view.points(&name)
            .iter()
            .filter(|point| point.attribute(&key) == Some(value.as_str()))
            .count()
            >= min
    })
}

/// Holds when every predicate holds. An empty list always holds.
pub fn all_of(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    let predicates: Vec<Predicate> = predicates.into_iter().collect();
    predicate(move |view| predicates.iter().all(|check| check(view)))
}

/// Holds when any predicate holds. An empty list never holds.
pub fn any_of(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    let predicates: Vec<Predicate> = predicates.into_iter().collect();
    predicate(move |view| predicates.iter().any(|check| check(view)))
}

/// Never holds; the run always uses its full budget.
pub fn never() -> Predicate {
    predicate(|_| false)
}

/// Holds after the first poll.
pub fn always() -> Predicate {
    predicate(|_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_probe_domain::{MergePolicy, Snapshot};
    use telemetry_probe_testkit::fixtures::{counter_point, gauge_point, instrument};

    fn view() -> AccumulatedResult {
        let snapshot = Snapshot::new()
            .with_points(
                instrument("rpc.count"),
                [counter_point(1, 1), counter_point(2, 2)],
            )
            .with_points(
                instrument("queue.depth"),
                [
                    gauge_point(3.0, "queue", "jobs"),
                    gauge_point(1.0, "queue", "mail"),
                ],
            );
        let mut view = AccumulatedResult::new();
        view.merge(snapshot, MergePolicy::Append);
        view
    }

    #[test]
    fn min_points_counts_one_instrument() {
        let view = view();
        assert!(min_points("rpc.count", 2)(&view));
        assert!(!min_points("rpc.count", 3)(&view));
        assert!(!min_points("missing", 1)(&view));
    }

    #[test]
    fn has_instruments_requires_every_name() {
        let view = view();
        assert!(has_instruments(["rpc.count", "queue.depth"])(&view));
        assert!(!has_instruments(["rpc.count", "rpc.latency"])(&view));
        assert!(has_instruments(Vec::<String>::new())(&view));
    }

    #[test]
    fn points_matching_filters_on_attribute() {
        let view = view();
        assert!(points_matching("queue.depth", "queue", "jobs", 1)(&view));
        assert!(!points_matching("queue.depth", "queue", "jobs", 2)(&view));
        assert!(!points_matching("queue.depth", "queue", "sms", 1)(&view));
    }

    #[test]
    fn combinators_follow_boolean_identities() {
        let view = view();
        assert!(all_of(Vec::<Predicate>::new())(&view));
        assert!(!any_of(Vec::<Predicate>::new())(&view));
        assert!(all_of([always(), min_points("rpc.count", 1)])(&view));
        assert!(!all_of([always(), never()])(&view));
        assert!(any_of([never(), always()])(&view));
    }
}
