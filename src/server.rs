//! HTTP exposition: Prometheus text metrics, health and a service index.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::feed::FeedKind;
use crate::metrics::{MetricState, ScrapeHealth};

pub const METRICS_PATH: &str = "/metrics";
pub const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricState>,
}

pub fn router(metrics: Arc<MetricState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(HEALTH_PATH, get(health))
        .route(METRICS_PATH, get(metrics_text))
        .with_state(AppState { metrics })
}

#[derive(Debug, Serialize)]
struct Index<'a> {
    name: &'static str,
    metrics: &'static str,
    health: &'static str,
    agency: &'a str,
    city: &'a str,
}

async fn index(State(state): State<AppState>) -> Response {
    Json(Index {
        name: env!("CARGO_PKG_NAME"),
        metrics: METRICS_PATH,
        health: HEALTH_PATH,
        agency: state.metrics.agency(),
        city: state.metrics.city(),
    })
    .into_response()
}

/// Served with 200 whatever the feeds' state; feed health lives in the body.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// Unix seconds of the last successful vehicle positions fetch.
    pub last_vehicle_positions_fetch: Option<i64>,
    pub last_trip_updates_fetch: Option<i64>,
    pub feeds: Vec<ScrapeHealth>,
}

impl HealthReport {
    pub fn from_state(metrics: &MetricState) -> Self {
        let last_success = |feed| {
            metrics
                .feed_health(feed)
                .and_then(|h| h.last_success)
                .map(|t| t.timestamp())
        };

        HealthReport {
            status: "ok",
            last_vehicle_positions_fetch: last_success(FeedKind::VehiclePositions),
            last_trip_updates_fetch: last_success(FeedKind::TripUpdates),
            feeds: metrics.scrape_health(),
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::from_state(&state.metrics))
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{self, Body};
    use axum::http::Request;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    use crate::analyzers::RouteCycleResult;

    fn state() -> Arc<MetricState> {
        Arc::new(MetricState::new("mbta", "boston").unwrap())
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body.to_vec())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = state();
        let mut red = RouteCycleResult::new("Red");
        red.vehicle_count = 3;
        metrics.publish_routes(
            FeedKind::VehiclePositions,
            1,
            &BTreeMap::from([("Red".to_string(), red)]),
        );

        let (status, content_type, body) = get_body(router(metrics), "/metrics").await;
        let text = String::from_utf8(body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(prometheus::TEXT_FORMAT));
        assert!(text.contains(
            "ptla_vehicle_count_by_route{agency=\"mbta\",city=\"boston\",route_id=\"Red\"} 3"
        ));
    }

    #[tokio::test]
    async fn test_health_before_first_cycle() {
        let (status, _, body) = get_body(router(state()), "/health").await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["last_vehicle_positions_fetch"].is_null());
        assert_eq!(json["feeds"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_health_reports_failing_feed_with_200() {
        let metrics = state();
        metrics.record_scrape(FeedKind::VehiclePositions, true, Duration::from_millis(120));
        metrics.record_scrape(FeedKind::TripUpdates, false, Duration::from_secs(15));

        let (status, _, body) = get_body(router(metrics), "/health").await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(json["last_vehicle_positions_fetch"].as_i64().is_some());
        assert!(json["last_trip_updates_fetch"].is_null());

        let feeds = json["feeds"].as_array().unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0]["feed_name"], "vehicle_positions");
        assert_eq!(feeds[1]["feed_name"], "trip_updates");
        assert_eq!(feeds[1]["success"], false);
        assert_eq!(feeds[1]["latency_seconds"], 15.0);
    }

    #[tokio::test]
    async fn test_index() {
        let (status, _, body) = get_body(router(state()), "/").await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "ptla");
        assert_eq!(json["metrics"], "/metrics");
        assert_eq!(json["agency"], "mbta");
    }
}
