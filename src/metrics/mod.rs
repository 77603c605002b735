//! Metric registry and scrape health.
//!
//! [`MetricState`] holds the latest value of every exported series and is
//! shared between the poll scheduler (writer) and the HTTP exposition
//! server (reader).

mod health;
mod state;

pub use health::ScrapeHealth;
pub use state::{LATENCY_BUCKETS, MetricState};
