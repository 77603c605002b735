//! Data types produced by the aggregation step.

use serde::Serialize;
use std::collections::BTreeMap;

/// Latest observed delay for one stop of one trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopDelay {
    pub trip_id: String,
    pub stop_id: String,
    pub delay_seconds: i32,
}

/// KPIs for a single route, derived from one cycle's entities only.
///
/// `vehicle_count` and `headway_seconds` come from the vehicle-positions
/// feed; `on_time_ratio` and `delays` from the trip-updates feed. A route
/// seen only in trip updates has a `vehicle_count` of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteCycleResult {
    pub route_id: String,
    pub vehicle_count: usize,
    pub headway_seconds: Option<f64>,
    pub on_time_ratio: Option<f64>,
    /// Keyed by `(trip_id, stop_id)`.
    #[serde(serialize_with = "serialize_delays")]
    pub delays: BTreeMap<(String, String), i32>,
}

impl RouteCycleResult {
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            ..Default::default()
        }
    }

    /// Folds the other feed's result for the same route into this one.
    pub fn merge(&mut self, other: RouteCycleResult) {
        self.vehicle_count += other.vehicle_count;
        self.headway_seconds = self.headway_seconds.or(other.headway_seconds);
        self.on_time_ratio = self.on_time_ratio.or(other.on_time_ratio);
        self.delays.extend(other.delays);
    }
}

fn serialize_delays<S>(
    delays: &BTreeMap<(String, String), i32>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(delays.iter().map(|((trip_id, stop_id), delay)| StopDelay {
        trip_id: trip_id.clone(),
        stop_id: stop_id.clone(),
        delay_seconds: *delay,
    }))
}
