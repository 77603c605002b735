//! Runtime configuration.
//!
//! Every `serve` option can be given on the command line or through the
//! environment (a `.env` file is loaded first by the binary).

use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::feed::FeedKind;

/// Settings the poll scheduler needs for every cycle.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub vehicle_positions_url: String,
    pub trip_updates_url: String,
    pub agency: String,
    pub city: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
}

impl PollConfig {
    pub fn url(&self, feed: FeedKind) -> &str {
        match feed {
            FeedKind::VehiclePositions => &self.vehicle_positions_url,
            FeedKind::TripUpdates => &self.trip_updates_url,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            vehicle_positions_url: String::new(),
            trip_updates_url: String::new(),
            agency: "unknown_agency".to_string(),
            city: "unknown_city".to_string(),
            poll_interval: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// URL of the GTFS-RT vehicle positions feed
    #[arg(long, env = "FEED_VEHICLE_POSITIONS", default_value = "")]
    pub vehicle_positions_url: String,

    /// URL of the GTFS-RT trip updates feed
    #[arg(long, env = "FEED_TRIP_UPDATES", default_value = "")]
    pub trip_updates_url: String,

    /// Agency label attached to every route series and snapshot
    #[arg(long, env = "AGENCY_ID", default_value = "unknown_agency")]
    pub agency: String,

    /// City label attached to every route series and snapshot
    #[arg(long, env = "CITY", default_value = "unknown_city")]
    pub city: String,

    /// Seconds between the start of consecutive poll cycles
    #[arg(long, env = "POLL_SECONDS", default_value_t = 15,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_seconds: u64,

    /// Per-request timeout for feed fetches, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECONDS", default_value_t = 15,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout_seconds: u64,

    /// File the per-cycle JSON snapshots are appended to
    #[arg(long, env = "LOG_PATH", default_value = "/var/log/ptla/app.log")]
    pub log_path: PathBuf,

    /// Address the metrics and health endpoints listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Drop delay series unseen for this many cycles (0 = keep forever)
    #[arg(long, env = "DELAY_SERIES_TTL_CYCLES", default_value_t = 0)]
    pub delay_series_ttl_cycles: u64,

    /// Optional API key sent with every feed request
    #[arg(long, env = "FEED_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Header carrying the API key
    #[arg(long, env = "FEED_API_KEY_HEADER", default_value = "Authorization")]
    pub api_key_header: String,
}

impl ServeArgs {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            vehicle_positions_url: self.vehicle_positions_url.clone(),
            trip_updates_url: self.trip_updates_url.clone(),
            agency: self.agency.clone(),
            city: self.city.clone(),
            poll_interval: Duration::from_secs(self.poll_seconds),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_seconds),
        }
    }
}
