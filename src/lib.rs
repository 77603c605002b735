//! Public Transit Latency Analytics.
//!
//! Polls a transit agency's GTFS-Realtime vehicle positions and trip updates
//! feeds on a fixed interval, derives per-route KPIs, exposes them as
//! Prometheus metrics and archives one JSON snapshot per cycle.

pub mod analyzers;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod metrics;
pub mod output;
pub mod parser;
pub mod scheduler;
pub mod server;
pub mod snapshot;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
