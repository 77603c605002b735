use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

use crate::analyzers::RouteCycleResult;
use crate::feed::FeedKind;
use crate::metrics::health::ScrapeHealth;

/// Latency histogram buckets, in seconds.
pub const LATENCY_BUCKETS: &[f64] = &[0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

const ROUTE_LABELS: &[&str] = &["agency", "city", "route_id"];
const DELAY_LABELS: &[&str] = &["agency", "city", "route_id", "trip_id", "stop_id"];

/// (route_id, trip_id, stop_id)
type DelayKey = (String, String, String);

/// Process-wide registry of the latest KPI values.
///
/// The poll scheduler is the only writer and writes once per cycle; the
/// exposition server reads at any time. Every series is updated atomically,
/// so readers never observe a torn value.
///
/// Gauges are overwritten, never cleared: a route or stop missing from a
/// cycle keeps its last reported value. Delay series, whose label
/// cardinality grows with trips and stops, can optionally be evicted after
/// going unseen for a number of cycles (see [`MetricState::with_delay_ttl`]).
pub struct MetricState {
    registry: Registry,
    agency: String,
    city: String,

    events_ingested: IntCounterVec,
    scrape_status: IntGaugeVec,
    scrape_latency: HistogramVec,
    vehicle_count: IntGaugeVec,
    headway: GaugeVec,
    arrival_delay: IntGaugeVec,
    on_time_ratio: GaugeVec,

    health: RwLock<BTreeMap<FeedKind, ScrapeHealth>>,
    delay_last_seen: Mutex<HashMap<DelayKey, u64>>,
    delay_ttl_cycles: u64,
}

impl MetricState {
    pub fn new(agency: &str, city: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let events_ingested = IntCounterVec::new(
            Opts::new(
                "ptla_events_ingested_total",
                "Total GTFS-RT events ingested",
            ),
            &["type"],
        )?;
        let scrape_status = IntGaugeVec::new(
            Opts::new(
                "ptla_scrape_status",
                "Feed scrape status 1=success, 0=failure",
            ),
            &["feed"],
        )?;
        let scrape_latency = HistogramVec::new(
            HistogramOpts::new(
                "ptla_scrape_latency_seconds",
                "Feed scrape latency seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["feed"],
        )?;
        let vehicle_count = IntGaugeVec::new(
            Opts::new("ptla_vehicle_count_by_route", "Number of vehicles by route"),
            ROUTE_LABELS,
        )?;
        let headway = GaugeVec::new(
            Opts::new("ptla_headway_seconds", "Estimated headway seconds by route"),
            ROUTE_LABELS,
        )?;
        let arrival_delay = IntGaugeVec::new(
            Opts::new(
                "ptla_arrival_delay_seconds",
                "Arrival delay seconds by route/trip/stop",
            ),
            DELAY_LABELS,
        )?;
        let on_time_ratio = GaugeVec::new(
            Opts::new("ptla_on_time_ratio", "On-time ratio (|delay| <= 60s) by route"),
            ROUTE_LABELS,
        )?;

        registry.register(Box::new(events_ingested.clone()))?;
        registry.register(Box::new(scrape_status.clone()))?;
        registry.register(Box::new(scrape_latency.clone()))?;
        registry.register(Box::new(vehicle_count.clone()))?;
        registry.register(Box::new(headway.clone()))?;
        registry.register(Box::new(arrival_delay.clone()))?;
        registry.register(Box::new(on_time_ratio.clone()))?;

        Ok(Self {
            registry,
            agency: agency.to_string(),
            city: city.to_string(),
            events_ingested,
            scrape_status,
            scrape_latency,
            vehicle_count,
            headway,
            arrival_delay,
            on_time_ratio,
            health: RwLock::new(BTreeMap::new()),
            delay_last_seen: Mutex::new(HashMap::new()),
            delay_ttl_cycles: 0,
        })
    }

    /// Removes delay series not refreshed within `cycles` cycles. Zero keeps
    /// them forever.
    pub fn with_delay_ttl(mut self, cycles: u64) -> Self {
        self.delay_ttl_cycles = cycles;
        self
    }

    pub fn agency(&self) -> &str {
        &self.agency
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    /// Records the outcome of a feed's fetch+decode attempt.
    pub fn record_scrape(&self, feed: FeedKind, success: bool, latency: Duration) {
        let label = feed.as_str();
        self.scrape_status
            .with_label_values(&[label])
            .set(i64::from(success));
        self.scrape_latency
            .with_label_values(&[label])
            .observe(latency.as_secs_f64());

        let mut health = self.health.write();
        let next = ScrapeHealth::next(health.get(&feed), feed, success, latency, Utc::now());
        health.insert(feed, next);
    }

    pub fn record_ingested(&self, feed: FeedKind, count: usize) {
        self.events_ingested
            .with_label_values(&[feed.as_str()])
            .inc_by(count as u64);
    }

    /// Overwrites the route gauges owned by `feed` with this cycle's results.
    ///
    /// Vehicle positions own vehicle count and headway; trip updates own the
    /// on-time ratio and per-stop delays. A route reported with fewer than
    /// two vehicles loses its headway series; routes missing from `results`
    /// keep their previous readings.
    pub fn publish_routes(
        &self,
        feed: FeedKind,
        cycle: u64,
        results: &BTreeMap<String, RouteCycleResult>,
    ) {
        for result in results.values() {
            let labels = [
                self.agency.as_str(),
                self.city.as_str(),
                result.route_id.as_str(),
            ];

            match feed {
                FeedKind::VehiclePositions => {
                    self.vehicle_count
                        .with_label_values(&labels)
                        .set(result.vehicle_count as i64);
                    match result.headway_seconds {
                        Some(headway) => self.headway.with_label_values(&labels).set(headway),
                        None => {
                            // Errors only when the route never had a headway.
                            let _ = self.headway.remove_label_values(&labels);
                        }
                    }
                }
                FeedKind::TripUpdates => {
                    if let Some(ratio) = result.on_time_ratio {
                        self.on_time_ratio.with_label_values(&labels).set(ratio);
                    }
                    self.publish_delays(cycle, result);
                }
            }
        }
    }

    fn publish_delays(&self, cycle: u64, result: &RouteCycleResult) {
        let mut seen = self.delay_last_seen.lock();

        for ((trip_id, stop_id), delay) in &result.delays {
            self.arrival_delay
                .with_label_values(&[
                    self.agency.as_str(),
                    self.city.as_str(),
                    result.route_id.as_str(),
                    trip_id.as_str(),
                    stop_id.as_str(),
                ])
                .set(i64::from(*delay));

            if self.delay_ttl_cycles > 0 {
                seen.insert(
                    (result.route_id.clone(), trip_id.clone(), stop_id.clone()),
                    cycle,
                );
            }
        }
    }

    /// Drops delay series last refreshed more than the configured TTL before
    /// `cycle`. Returns the number of series removed.
    pub fn evict_stale_delays(&self, cycle: u64) -> usize {
        if self.delay_ttl_cycles == 0 {
            return 0;
        }

        let mut seen = self.delay_last_seen.lock();
        let ttl = self.delay_ttl_cycles;
        let mut evicted = 0;

        seen.retain(|(route_id, trip_id, stop_id), last| {
            if cycle.saturating_sub(*last) < ttl {
                return true;
            }
            // A missing series is not an error; it has already been removed.
            let _ = self.arrival_delay.remove_label_values(&[
                self.agency.as_str(),
                self.city.as_str(),
                route_id.as_str(),
                trip_id.as_str(),
                stop_id.as_str(),
            ]);
            evicted += 1;
            false
        });

        if evicted > 0 {
            debug!(evicted, cycle, "Evicted stale delay series");
        }
        evicted
    }

    /// Latest scrape health per feed, ordered by feed.
    pub fn scrape_health(&self) -> Vec<ScrapeHealth> {
        self.health.read().values().cloned().collect()
    }

    pub fn feed_health(&self, feed: FeedKind) -> Option<ScrapeHealth> {
        self.health.read().get(&feed).cloned()
    }

    /// All metric families as currently held.
    pub fn snapshot_all(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.snapshot_all(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Current value of a counter or gauge sample whose labels include all of
    /// `labels`, or the observation count of a histogram.
    pub fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = self
            .snapshot_all()
            .into_iter()
            .find(|f| f.get_name() == name)?;

        family
            .get_metric()
            .iter()
            .find(|m| {
                labels.iter().all(|(k, v)| {
                    m.get_label()
                        .iter()
                        .any(|l| l.get_name() == *k && l.get_value() == *v)
                })
            })
            .map(|m| {
                if m.has_counter() {
                    m.get_counter().get_value()
                } else if m.has_gauge() {
                    m.get_gauge().get_value()
                } else {
                    m.get_histogram().get_sample_count() as f64
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> MetricState {
        MetricState::new("mbta", "boston").unwrap()
    }

    fn vp_result(
        route: &str,
        count: usize,
        headway: Option<f64>,
    ) -> BTreeMap<String, RouteCycleResult> {
        let mut r = RouteCycleResult::new(route);
        r.vehicle_count = count;
        r.headway_seconds = headway;
        BTreeMap::from([(route.to_string(), r)])
    }

    fn tu_result(
        route: &str,
        delays: &[(&str, &str, i32)],
        ratio: Option<f64>,
    ) -> BTreeMap<String, RouteCycleResult> {
        let mut r = RouteCycleResult::new(route);
        r.on_time_ratio = ratio;
        for (trip, stop, delay) in delays {
            r.delays.insert((trip.to_string(), stop.to_string()), *delay);
        }
        BTreeMap::from([(route.to_string(), r)])
    }

    #[test]
    fn test_counter_accumulates() {
        let s = state();
        s.record_ingested(FeedKind::VehiclePositions, 3);
        s.record_ingested(FeedKind::VehiclePositions, 4);
        s.record_ingested(FeedKind::TripUpdates, 0);

        assert_eq!(
            s.sample("ptla_events_ingested_total", &[("type", "vehicle_positions")]),
            Some(7.0)
        );
        assert_eq!(
            s.sample("ptla_events_ingested_total", &[("type", "trip_updates")]),
            Some(0.0)
        );
    }

    #[test]
    fn test_scrape_status_and_latency() {
        let s = state();
        s.record_scrape(FeedKind::VehiclePositions, true, Duration::from_millis(300));
        s.record_scrape(FeedKind::VehiclePositions, false, Duration::from_secs(15));

        assert_eq!(
            s.sample("ptla_scrape_status", &[("feed", "vehicle_positions")]),
            Some(0.0)
        );
        assert_eq!(
            s.sample("ptla_scrape_latency_seconds", &[("feed", "vehicle_positions")]),
            Some(2.0)
        );

        let health = s.feed_health(FeedKind::VehiclePositions).unwrap();
        assert!(!health.success);
        assert_eq!(health.latency_seconds, 15.0);
        assert!(health.last_success.is_some());
    }

    #[test]
    fn test_route_gauges_are_stale_not_cleared() {
        let s = state();
        s.publish_routes(FeedKind::VehiclePositions, 1, &vp_result("Red", 4, Some(100.0)));
        s.publish_routes(FeedKind::VehiclePositions, 2, &vp_result("Blue", 1, None));

        let red = [("route_id", "Red"), ("agency", "mbta"), ("city", "boston")];
        assert_eq!(s.sample("ptla_vehicle_count_by_route", &red), Some(4.0));
        assert_eq!(s.sample("ptla_headway_seconds", &red), Some(100.0));
        assert_eq!(
            s.sample("ptla_vehicle_count_by_route", &[("route_id", "Blue")]),
            Some(1.0)
        );
        // single-vehicle route never gets a headway series
        assert_eq!(s.sample("ptla_headway_seconds", &[("route_id", "Blue")]), None);
    }

    #[test]
    fn test_headway_removed_when_route_drops_to_one_vehicle() {
        let s = state();
        s.publish_routes(FeedKind::VehiclePositions, 1, &vp_result("Red", 2, Some(100.0)));
        s.publish_routes(FeedKind::VehiclePositions, 2, &vp_result("Red", 1, None));

        assert_eq!(
            s.sample("ptla_vehicle_count_by_route", &[("route_id", "Red")]),
            Some(1.0)
        );
        assert_eq!(s.sample("ptla_headway_seconds", &[("route_id", "Red")]), None);

        s.publish_routes(FeedKind::VehiclePositions, 3, &vp_result("Red", 3, Some(80.0)));
        assert_eq!(
            s.sample("ptla_headway_seconds", &[("route_id", "Red")]),
            Some(80.0)
        );
    }

    #[test]
    fn test_delay_overwrites_previous_reading() {
        let s = state();
        s.publish_routes(FeedKind::TripUpdates, 1, &tu_result("Red", &[("t1", "s1", 30)], Some(1.0)));
        s.publish_routes(FeedKind::TripUpdates, 2, &tu_result("Red", &[("t1", "s1", -90)], Some(0.0)));

        let key = [("route_id", "Red"), ("trip_id", "t1"), ("stop_id", "s1")];
        assert_eq!(s.sample("ptla_arrival_delay_seconds", &key), Some(-90.0));
        assert_eq!(s.sample("ptla_on_time_ratio", &[("route_id", "Red")]), Some(0.0));
    }

    #[test]
    fn test_trip_update_results_do_not_touch_vehicle_count() {
        let s = state();
        s.publish_routes(FeedKind::VehiclePositions, 1, &vp_result("Red", 4, None));
        s.publish_routes(FeedKind::TripUpdates, 1, &tu_result("Red", &[], Some(0.5)));

        assert_eq!(
            s.sample("ptla_vehicle_count_by_route", &[("route_id", "Red")]),
            Some(4.0)
        );
    }

    #[test]
    fn test_delay_ttl_evicts_unseen_series() {
        let s = state().with_delay_ttl(2);
        s.publish_routes(
            FeedKind::TripUpdates,
            1,
            &tu_result("Red", &[("t1", "s1", 30), ("t2", "s1", 10)], Some(1.0)),
        );
        s.publish_routes(FeedKind::TripUpdates, 2, &tu_result("Red", &[("t2", "s1", 12)], Some(1.0)));

        assert_eq!(s.evict_stale_delays(2), 0);
        assert_eq!(s.evict_stale_delays(3), 1);

        assert_eq!(s.sample("ptla_arrival_delay_seconds", &[("trip_id", "t1")]), None);
        assert_eq!(
            s.sample("ptla_arrival_delay_seconds", &[("trip_id", "t2")]),
            Some(12.0)
        );
    }

    #[test]
    fn test_no_ttl_never_evicts() {
        let s = state();
        s.publish_routes(FeedKind::TripUpdates, 1, &tu_result("Red", &[("t1", "s1", 30)], None));

        assert_eq!(s.evict_stale_delays(1_000), 0);
        assert_eq!(
            s.sample("ptla_arrival_delay_seconds", &[("trip_id", "t1")]),
            Some(30.0)
        );
    }

    #[test]
    fn test_render_text_format() {
        let s = state();
        s.record_ingested(FeedKind::TripUpdates, 2);
        s.publish_routes(FeedKind::VehiclePositions, 1, &vp_result("Red", 2, Some(60.0)));

        let text = s.render().unwrap();
        assert!(text.contains("# TYPE ptla_events_ingested_total counter"));
        assert!(text.contains("ptla_events_ingested_total{type=\"trip_updates\"} 2"));
        assert!(text.contains(
            "ptla_headway_seconds{agency=\"mbta\",city=\"boston\",route_id=\"Red\"} 60"
        ));
    }
}
