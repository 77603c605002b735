//! Per-route KPI derivation.
//!
//! This module turns one cycle's decoded entities into [`RouteCycleResult`]s:
//! distinct vehicle counts and median-gap headways from vehicle positions,
//! verbatim delays and the on-time ratio from trip updates. Nothing is
//! carried over between cycles.

pub mod aggregate;
pub mod types;
pub mod utility;

pub use aggregate::{ON_TIME_THRESHOLD_SECONDS, aggregate};
pub use types::{RouteCycleResult, StopDelay};
