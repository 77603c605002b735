//! Typed failures for the two stages of a feed pipeline.
//!
//! Both errors are contained within one feed's pipeline for one cycle; the
//! scheduler turns them into a failed scrape status and moves on.

use std::time::Duration;

use thiserror::Error;

use crate::feed::FeedKind;

/// A feed could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{feed}: no URL configured")]
    NotConfigured { feed: FeedKind },

    #[error("{feed}: invalid URL {url:?}: {reason}")]
    InvalidUrl {
        feed: FeedKind,
        url: String,
        reason: String,
    },

    #[error("{feed}: timed out after {timeout:?}")]
    Timeout { feed: FeedKind, timeout: Duration },

    #[error("{feed}: HTTP status {status}")]
    Status {
        feed: FeedKind,
        status: reqwest::StatusCode,
    },

    #[error("{feed}: transport error: {source}")]
    Transport {
        feed: FeedKind,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn feed(&self) -> FeedKind {
        match self {
            FetchError::NotConfigured { feed }
            | FetchError::InvalidUrl { feed, .. }
            | FetchError::Timeout { feed, .. }
            | FetchError::Status { feed, .. }
            | FetchError::Transport { feed, .. } => *feed,
        }
    }

    /// Short machine-readable cause, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotConfigured { .. } => "not_configured",
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Status { .. } => "http_status",
            FetchError::Transport { .. } => "transport",
        }
    }
}

/// A fetched payload was not a usable GTFS-Realtime feed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("payload has no feed header version")]
    MissingHeader,
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Protobuf(_) => "protobuf",
            DecodeError::MissingHeader => "missing_header",
        }
    }
}
