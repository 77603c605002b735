use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::feed::FeedKind;

/// Result of a feed's most recent fetch+decode attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeHealth {
    pub feed_name: FeedKind,
    pub success: bool,
    pub latency_seconds: f64,
    pub last_updated: DateTime<Utc>,
    /// When the feed last fetched and decoded cleanly, if ever.
    pub last_success: Option<DateTime<Utc>>,
}

impl ScrapeHealth {
    /// Replaces the previous reading, keeping the last success time when
    /// this attempt failed.
    pub fn next(
        previous: Option<&ScrapeHealth>,
        feed: FeedKind,
        success: bool,
        latency: Duration,
        now: DateTime<Utc>,
    ) -> ScrapeHealth {
        let last_success = if success {
            Some(now)
        } else {
            previous.and_then(|p| p.last_success)
        };

        ScrapeHealth {
            feed_name: feed,
            success,
            latency_seconds: latency.as_secs_f64(),
            last_updated: now,
            last_success,
        }
    }
}
