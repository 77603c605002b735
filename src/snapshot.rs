//! One cycle's aggregated result, as archived to the structured log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::analyzers::RouteCycleResult;

/// Value of the `type` field on every snapshot line.
pub const SNAPSHOT_TYPE: &str = "ptla_snapshot";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSnapshot {
    pub route_id: String,
    pub vehicle_count: usize,
    pub on_time_ratio: Option<f64>,
    pub headway_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub agency: String,
    pub city: String,
    /// Ordered by route id.
    pub routes: Vec<RouteSnapshot>,
}

impl Snapshot {
    pub fn new(agency: &str, city: &str, timestamp: DateTime<Utc>) -> Self {
        Snapshot {
            timestamp,
            record_type: SNAPSHOT_TYPE,
            agency: agency.to_string(),
            city: city.to_string(),
            routes: Vec::new(),
        }
    }

    /// Builds a snapshot from the merged route results of one cycle.
    pub fn from_results(
        agency: &str,
        city: &str,
        timestamp: DateTime<Utc>,
        results: &BTreeMap<String, RouteCycleResult>,
    ) -> Self {
        let mut s = Snapshot::new(agency, city, timestamp);
        s.routes = results
            .values()
            .map(|r| RouteSnapshot {
                route_id: r.route_id.clone(),
                vehicle_count: r.vehicle_count,
                on_time_ratio: r.on_time_ratio,
                headway_seconds: r.headway_seconds,
            })
            .collect();
        s
    }
}
