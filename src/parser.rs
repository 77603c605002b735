//! Protobuf parser for GTFS Realtime feeds.
//!
//! [`decode`] is the boundary between raw payload bytes and the typed
//! entities the aggregator works on. It is pure: a payload either yields a
//! complete entity list or a [`DecodeError`], never partial data.

use prost::Message;

use crate::error::DecodeError;
use crate::feed::{DecodedFeed, FeedEntities, FeedKind, TripUpdate, VehiclePosition};
use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Decodes a payload and extracts the entities of the requested `kind`.
///
/// Entities of the other kind present in the same payload are ignored. A
/// payload without a header version (an empty body decodes to exactly that)
/// is rejected.
pub fn decode(bytes: &[u8], kind: FeedKind) -> Result<DecodedFeed, DecodeError> {
    let feed = parse_feed(bytes)?;
    if feed.header.gtfs_realtime_version.is_empty() {
        return Err(DecodeError::MissingHeader);
    }

    let entities = match kind {
        FeedKind::VehiclePositions => FeedEntities::VehiclePositions(vehicle_positions(&feed)),
        FeedKind::TripUpdates => FeedEntities::TripUpdates(trip_updates(&feed)),
    };

    Ok(DecodedFeed {
        entity_count: feed.entity.len(),
        entities,
    })
}

/// One record per entity carrying a vehicle.
pub fn vehicle_positions(feed: &FeedMessage) -> Vec<VehiclePosition> {
    let header_ts = feed.header.timestamp;

    feed.entity
        .iter()
        .filter_map(|e| {
            let v = e.vehicle.as_ref()?;
            let route_id = v
                .trip
                .as_ref()
                .and_then(|t| t.route_id.clone())
                .unwrap_or_default();
            let vehicle_id = v
                .vehicle
                .as_ref()
                .and_then(|d| d.id.clone())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| e.id.clone());
            let timestamp = v.timestamp.or(header_ts).unwrap_or(0);

            Some(VehiclePosition {
                route_id,
                vehicle_id,
                timestamp,
            })
        })
        .collect()
}

/// One record per stop-time update that carries an arrival or departure delay.
pub fn trip_updates(feed: &FeedMessage) -> Vec<TripUpdate> {
    let mut out = Vec::new();

    for e in &feed.entity {
        let Some(tu) = &e.trip_update else {
            continue;
        };

        let route_id = tu.trip.route_id.clone().unwrap_or_default();
        let trip_id = tu
            .trip
            .trip_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| e.id.clone());

        for stu in &tu.stop_time_update {
            let delay = stu
                .arrival
                .as_ref()
                .and_then(|ev| ev.delay)
                .or_else(|| stu.departure.as_ref().and_then(|ev| ev.delay));

            let Some(delay) = delay else {
                continue;
            };

            out.push(TripUpdate {
                route_id: route_id.clone(),
                trip_id: trip_id.clone(),
                stop_id: stu.stop_id.clone().unwrap_or_default(),
                arrival_delay_seconds: delay,
            });
        }
    }

    out
}
