//! Health state owned by the sampling loop.
//!
//! The loop is the only writer; readers receive [`HealthSnapshot`] copies
//! and never a reference into live state.

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Lag below this is considered fully healthy.
const HEALTHY_LAG: Duration = Duration::from_millis(10);

/// Coarse event-loop health classification derived from the most recent
/// probe only.
///
/// Status says nothing about whether the monitor is still advancing; a
/// stalled monitor keeps reporting its last classification. Staleness is
/// detected by watching [`HealthSnapshot::total_measurements`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Lag under 10ms.
    Healthy,
    /// Lag under the blocking threshold.
    Ok,
    /// Lag between the blocking and critical thresholds.
    Degraded,
    /// Lag at or above the critical threshold.
    Critical,
}

impl HealthStatus {
    pub(crate) fn classify(lag: Duration, blocking: Duration, critical: Duration) -> Self {
        if lag < HEALTHY_LAG {
            Self::Healthy
        } else if lag < blocking {
            Self::Ok
        } else if lag < critical {
            Self::Degraded
        } else {
            Self::Critical
        }
    }
}

/// Immutable point-in-time copy of the monitor's health state.
///
/// Serializes to JSON with durations as fractional seconds, suitable for
/// exposing through a diagnostics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// Excess delay observed during the most recent probe.
    #[serde(rename = "lag_seconds", serialize_with = "duration_secs")]
    pub lag: Duration,
    /// Largest lag observed since start or the last reset.
    #[serde(rename = "max_lag_seconds", serialize_with = "duration_secs")]
    pub max_lag: Duration,
    /// Alive runtime tasks at measurement time.
    pub active_tasks: usize,
    /// Fraction of elapsed time classified as busy, in [0, 1].
    pub utilization: f64,
    /// Cumulative probes whose lag exceeded the blocking threshold.
    pub blocking_events: u64,
    /// Cumulative probe count. A frozen value means the monitor has
    /// stopped advancing.
    pub total_measurements: u64,
    /// Classification of the most recent lag value.
    pub status: HealthStatus,
}

fn duration_secs<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64())
}

/// Live accumulators behind the monitor's mutex.
///
/// `busy_time` accumulates only lag (the excess over the requested
/// interval), so utilization under-counts time legitimately spent running
/// other tasks within the interval budget. This is the established formula
/// for sleep-based lag monitors and is kept for comparability with other
/// implementations of the technique.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoopStats {
    pub lag: Duration,
    pub max_lag: Duration,
    pub active_tasks: usize,
    pub utilization: f64,
    pub blocking_events: u64,
    pub total_measurements: u64,
    pub busy_time: Duration,
    pub total_time: Duration,
}
