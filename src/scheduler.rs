//! Poll cycle driver.
//!
//! Each cycle fetches both feeds concurrently, decodes and aggregates
//! whatever arrived, publishes to the [`MetricState`] and finally emits one
//! [`Snapshot`]. A failure in one feed never affects the other, and cycles
//! never overlap.

use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::analyzers::aggregate::{aggregate, merge_results};
use crate::config::PollConfig;
use crate::error::{DecodeError, FetchError};
use crate::feed::{DecodedFeed, FeedKind};
use crate::fetch::{FetchAttempt, HttpClient, fetch_feed};
use crate::metrics::MetricState;
use crate::output::SnapshotEmitter;
use crate::parser::decode;
use crate::snapshot::Snapshot;

/// Where the scheduler is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Decoding,
    Aggregating,
    Publishing,
}

/// What one feed produced in one cycle.
#[derive(Debug)]
pub enum FeedOutcome {
    Decoded(DecodedFeed),
    FetchFailed(FetchError),
    DecodeFailed(DecodeError),
}

impl FeedOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FeedOutcome::Decoded(_))
    }
}

#[derive(Debug)]
pub struct FeedCycle {
    pub feed: FeedKind,
    pub latency: Duration,
    pub outcome: FeedOutcome,
}

/// Everything a cycle did, returned for logging and tests.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub feeds: Vec<FeedCycle>,
    pub snapshot: Snapshot,
}

impl CycleReport {
    pub fn feed(&self, feed: FeedKind) -> Option<&FeedCycle> {
        self.feeds.iter().find(|f| f.feed == feed)
    }
}

pub struct PollScheduler {
    config: PollConfig,
    client: Arc<dyn HttpClient>,
    metrics: Arc<MetricState>,
    emitter: SnapshotEmitter,
    phase: Phase,
    cycle: u64,
}

impl PollScheduler {
    pub fn new(
        config: PollConfig,
        client: Arc<dyn HttpClient>,
        metrics: Arc<MetricState>,
        emitter: SnapshotEmitter,
    ) -> Self {
        Self {
            config,
            client,
            metrics,
            emitter,
            phase: Phase::Idle,
            cycle: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn emitter(&self) -> &SnapshotEmitter {
        &self.emitter
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
    }

    /// Runs cycles every `poll_interval` until `shutdown` resolves.
    ///
    /// A cycle that overruns the interval delays the next tick instead of
    /// triggering a burst; an in-flight cycle always completes before the
    /// scheduler stops.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval = ?self.config.poll_interval,
            agency = %self.config.agency,
            city = %self.config.city,
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        info!(cycles = self.cycle, "Poll scheduler stopped");
    }

    /// Runs one fetch → decode → aggregate → publish pass over both feeds.
    #[tracing::instrument(skip_all, fields(cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;

        self.enter(Phase::Fetching);
        let timeout = self.config.fetch_timeout;
        let client = Arc::clone(&self.client);
        let (vp, tu) = tokio::join!(
            fetch_feed(
                client.as_ref(),
                FeedKind::VehiclePositions,
                self.config.url(FeedKind::VehiclePositions),
                timeout,
            ),
            fetch_feed(
                client.as_ref(),
                FeedKind::TripUpdates,
                self.config.url(FeedKind::TripUpdates),
                timeout,
            ),
        );

        self.enter(Phase::Decoding);
        let feeds: Vec<FeedCycle> = [(FeedKind::VehiclePositions, vp), (FeedKind::TripUpdates, tu)]
            .into_iter()
            .map(|(feed, attempt)| decode_attempt(feed, attempt))
            .collect();

        self.enter(Phase::Aggregating);
        let aggregated: Vec<_> = feeds
            .iter()
            .filter_map(|fc| match &fc.outcome {
                FeedOutcome::Decoded(decoded) => Some((fc.feed, aggregate(&decoded.entities))),
                _ => None,
            })
            .collect();

        self.enter(Phase::Publishing);
        for fc in &feeds {
            self.metrics
                .record_scrape(fc.feed, fc.outcome.is_success(), fc.latency);

            match &fc.outcome {
                FeedOutcome::Decoded(decoded) => {
                    self.metrics.record_ingested(fc.feed, decoded.entity_count);
                    debug!(
                        feed = %fc.feed,
                        entities = decoded.entity_count,
                        records = decoded.entities.len(),
                        "Feed ingested"
                    );
                }
                FeedOutcome::FetchFailed(e) => {
                    error!(feed = %e.feed(), kind = e.kind(), error = %e, "Feed fetch failed");
                }
                FeedOutcome::DecodeFailed(e) => {
                    error!(feed = %fc.feed, kind = e.kind(), error = %e, "Feed decode failed");
                }
            }
        }

        let mut merged = BTreeMap::new();
        for (feed, results) in aggregated {
            self.metrics.publish_routes(feed, cycle, &results);
            merge_results(&mut merged, results);
        }
        self.metrics.evict_stale_delays(cycle);

        let snapshot =
            Snapshot::from_results(&self.config.agency, &self.config.city, Utc::now(), &merged);
        self.emitter.emit(&snapshot);

        self.enter(Phase::Idle);

        let healthy = feeds.iter().filter(|f| f.outcome.is_success()).count();
        info!(
            routes = snapshot.routes.len(),
            healthy_feeds = healthy,
            "Cycle complete"
        );

        CycleReport {
            cycle,
            feeds,
            snapshot,
        }
    }
}

fn decode_attempt(feed: FeedKind, attempt: FetchAttempt) -> FeedCycle {
    let outcome = match attempt.result {
        Err(e) => FeedOutcome::FetchFailed(e),
        Ok(bytes) => match decode(&bytes, feed) {
            Ok(decoded) => FeedOutcome::Decoded(decoded),
            Err(e) => FeedOutcome::DecodeFailed(e),
        },
    };

    FeedCycle {
        feed,
        latency: attempt.latency,
        outcome,
    }
}
