use crate::analyzers::types::RouteCycleResult;
use crate::analyzers::utility::{median, ratio};
use crate::feed::{FeedEntities, TripUpdate, VehiclePosition};
use std::collections::{BTreeMap, HashMap};

/// A stop-time update counts as on time when `|delay| <= ON_TIME_THRESHOLD_SECONDS`.
pub const ON_TIME_THRESHOLD_SECONDS: i32 = 60;

/// Aggregates one feed's decoded entities into per-route results, keyed and
/// ordered by route id.
pub fn aggregate(entities: &FeedEntities) -> BTreeMap<String, RouteCycleResult> {
    match entities {
        FeedEntities::VehiclePositions(vps) => aggregate_vehicle_positions(vps),
        FeedEntities::TripUpdates(tus) => aggregate_trip_updates(tus),
    }
}

/// Counts distinct vehicles per route and estimates each route's headway.
///
/// A vehicle reported more than once on the same route contributes a single
/// timestamp (its latest) to the headway estimate.
pub fn aggregate_vehicle_positions(vps: &[VehiclePosition]) -> BTreeMap<String, RouteCycleResult> {
    let mut by_route: BTreeMap<&str, HashMap<&str, u64>> = BTreeMap::new();

    for vp in vps {
        let latest = by_route
            .entry(vp.route_id.as_str())
            .or_default()
            .entry(vp.vehicle_id.as_str())
            .or_insert(vp.timestamp);
        *latest = (*latest).max(vp.timestamp);
    }

    by_route
        .into_iter()
        .map(|(route_id, vehicles)| {
            let timestamps: Vec<u64> = vehicles.into_values().collect();

            let mut result = RouteCycleResult::new(route_id);
            result.vehicle_count = timestamps.len();
            result.headway_seconds = estimate_headway_seconds(&timestamps);

            (route_id.to_string(), result)
        })
        .collect()
}

/// Median gap between consecutive vehicle timestamps.
///
/// Returns `None` for fewer than two vehicles rather than a misleading zero.
pub fn estimate_headway_seconds(timestamps: &[u64]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let gaps: Vec<f64> = sorted.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    median(&gaps)
}

/// Collects delays and computes the on-time ratio per route.
pub fn aggregate_trip_updates(tus: &[TripUpdate]) -> BTreeMap<String, RouteCycleResult> {
    let mut routes: BTreeMap<String, RouteCycleResult> = BTreeMap::new();
    let mut on_time: HashMap<&str, (usize, usize)> = HashMap::new();

    for tu in tus {
        routes
            .entry(tu.route_id.clone())
            .or_insert_with(|| RouteCycleResult::new(tu.route_id.clone()))
            .delays
            .insert(
                (tu.trip_id.clone(), tu.stop_id.clone()),
                tu.arrival_delay_seconds,
            );

        let (ok, total) = on_time.entry(tu.route_id.as_str()).or_default();
        *total += 1;
        if is_on_time(tu.arrival_delay_seconds) {
            *ok += 1;
        }
    }

    for (route_id, result) in routes.iter_mut() {
        let (ok, total) = on_time
            .get(route_id.as_str())
            .copied()
            .unwrap_or_default();
        result.on_time_ratio = ratio(ok, total);
    }

    routes
}

pub fn is_on_time(delay_seconds: i32) -> bool {
    delay_seconds.unsigned_abs() <= ON_TIME_THRESHOLD_SECONDS.unsigned_abs()
}

/// Merges per-feed results into one map, combining entries for routes seen
/// in both feeds.
pub fn merge_results(
    into: &mut BTreeMap<String, RouteCycleResult>,
    from: BTreeMap<String, RouteCycleResult>,
) {
    for (route_id, result) in from {
        match into.get_mut(&route_id) {
            Some(existing) => existing.merge(result),
            None => {
                into.insert(route_id, result);
            }
        }
    }
}
