//! Typed entities extracted from the two GTFS-Realtime feeds.
//!
//! These records live for a single poll cycle; nothing here is carried over
//! between cycles.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Which of the two polled feeds a payload, metric or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    VehiclePositions,
    TripUpdates,
}

impl FeedKind {
    pub const ALL: [FeedKind; 2] = [FeedKind::VehiclePositions, FeedKind::TripUpdates];

    /// Label value used for the `feed` and `type` metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::VehiclePositions => "vehicle_positions",
            FeedKind::TripUpdates => "trip_updates",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle_positions" | "vp" => Ok(FeedKind::VehiclePositions),
            "trip_updates" | "tu" => Ok(FeedKind::TripUpdates),
            other => Err(format!(
                "unknown feed kind {other:?} (expected vehicle_positions or trip_updates)"
            )),
        }
    }
}

/// One vehicle observed in a vehicle-positions payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehiclePosition {
    pub route_id: String,
    pub vehicle_id: String,
    /// POSIX seconds.
    pub timestamp: u64,
}

/// One stop-time prediction observed in a trip-updates payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripUpdate {
    pub route_id: String,
    pub trip_id: String,
    pub stop_id: String,
    /// Positive means late.
    pub arrival_delay_seconds: i32,
}

/// The decoded contents of one feed for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEntities {
    VehiclePositions(Vec<VehiclePosition>),
    TripUpdates(Vec<TripUpdate>),
}

impl FeedEntities {
    pub fn len(&self) -> usize {
        match self {
            FeedEntities::VehiclePositions(v) => v.len(),
            FeedEntities::TripUpdates(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFeed {
    /// Number of `FeedEntity` messages in the payload, whatever they carry.
    /// This is what `ptla_events_ingested_total` counts.
    pub entity_count: usize,
    pub entities: FeedEntities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_kind_round_trips_through_label() {
        for kind in FeedKind::ALL {
            assert_eq!(kind.as_str().parse::<FeedKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_feed_kind_rejects_unknown() {
        assert!("alerts".parse::<FeedKind>().is_err());
    }

    #[test]
    fn test_entities_len() {
        let entities = FeedEntities::TripUpdates(vec![TripUpdate {
            route_id: "Red".into(),
            trip_id: "t1".into(),
            stop_id: "s1".into(),
            arrival_delay_seconds: 12,
        }]);

        assert_eq!(entities.len(), 1);
        assert!(!entities.is_empty());
    }
}
