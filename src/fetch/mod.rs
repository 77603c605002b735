//! Timed HTTP retrieval of feed payloads.
//!
//! [`fetch_feed`] never fails past its boundary: every attempt yields a
//! [`FetchAttempt`] carrying the elapsed wall-clock time and either the
//! payload or a typed [`FetchError`].

mod api_key;
mod basic;
mod client;

pub use api_key::ApiKey;
pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::FetchError;
use crate::feed::FeedKind;

/// Outcome of one fetch, with latency recorded on success and failure alike.
#[derive(Debug)]
pub struct FetchAttempt {
    pub latency: Duration,
    pub result: Result<Bytes, FetchError>,
}

/// Fetches `url` for `feed`, bounded by `timeout`, and times the attempt.
#[tracing::instrument(skip_all, fields(feed = %feed))]
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    feed: FeedKind,
    url: &str,
    timeout: Duration,
) -> FetchAttempt {
    let started = Instant::now();
    let result = fetch_bytes(client, feed, url, timeout).await;
    let latency = started.elapsed();

    match &result {
        Ok(bytes) => debug!(bytes = bytes.len(), ?latency, "Feed fetched"),
        Err(e) => debug!(error = %e, ?latency, "Feed fetch failed"),
    }

    FetchAttempt { latency, result }
}

/// Performs a single GET and returns the body of a 2xx response.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    feed: FeedKind,
    url: &str,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    if url.trim().is_empty() {
        return Err(FetchError::NotConfigured { feed });
    }

    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        feed,
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let request = async {
        let resp = client
            .get(parsed)
            .await
            .map_err(|source| classify(feed, timeout, source))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { feed, status });
        }

        resp.bytes()
            .await
            .map_err(|source| classify(feed, timeout, source))
    };

    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout { feed, timeout }),
    }
}

fn classify(feed: FeedKind, timeout: Duration, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout { feed, timeout }
    } else {
        FetchError::Transport { feed, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> BasicClient {
        BasicClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_latency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vp.pb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let url = format!("{}/vp.pb", server.uri());
        let attempt = fetch_feed(
            &client(),
            FeedKind::VehiclePositions,
            &url,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(attempt.result.unwrap().as_ref(), &[1u8, 2, 3]);
        assert!(attempt.latency > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_non_2xx_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let attempt = fetch_feed(
            &client(),
            FeedKind::TripUpdates,
            &server.uri(),
            Duration::from_secs(5),
        )
        .await;

        match attempt.result {
            Err(FetchError::Status { feed, status }) => {
                assert_eq!(feed, FeedKind::TripUpdates);
                assert_eq!(status.as_u16(), 503);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let attempt = fetch_feed(
            &client(),
            FeedKind::VehiclePositions,
            &server.uri(),
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(attempt.result, Err(FetchError::Timeout { .. })));
        assert!(attempt.latency >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/feed");

        let attempt = fetch_feed(
            &client(),
            FeedKind::VehiclePositions,
            &url,
            Duration::from_secs(2),
        )
        .await;

        assert!(matches!(attempt.result, Err(FetchError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_empty_url_is_not_configured() {
        let attempt = fetch_feed(
            &client(),
            FeedKind::TripUpdates,
            "",
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(
            attempt.result,
            Err(FetchError::NotConfigured {
                feed: FeedKind::TripUpdates
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let attempt = fetch_feed(
            &client(),
            FeedKind::TripUpdates,
            "not a url",
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(attempt.result, Err(FetchError::InvalidUrl { .. })));
    }
}
