//! Event-loop lag monitoring.
//!
//! The monitor measures scheduler responsiveness with the sleep-based lag
//! technique: request a sleep of `interval`, measure the actual elapsed
//! time, and treat the excess as lag. A healthy loop shows lag near zero;
//! a blocked loop shows lag spikes proportional to the blockage.

mod sampler;
mod state;

pub use sampler::LagMonitor;
pub use state::{HealthSnapshot, HealthStatus};

use std::time::Duration;
use thiserror::Error;

/// Error type for monitor construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("probe interval must be greater than zero")]
    ZeroInterval,

    #[error("blocking threshold must be greater than zero")]
    ZeroBlockingThreshold,

    #[error("critical threshold ({critical:?}) must not be below blocking threshold ({blocking:?})")]
    ThresholdOrder {
        blocking: Duration,
        critical: Duration,
    },
}

/// Configuration for a [`LagMonitor`].
///
/// Values are validated eagerly at construction; invalid configurations are
/// rejected with a [`ConfigError`], never silently clamped.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Probe period. Smaller values are more accurate but add overhead.
    pub interval: Duration,
    /// Lag above this counts as a blocking event (warning severity).
    pub blocking_threshold: Duration,
    /// Lag above this is classified as critical.
    pub critical_threshold: Duration,
    /// Service name attached to every exported metric.
    pub service_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            blocking_threshold: Duration::from_millis(50),
            critical_threshold: Duration::from_millis(500),
            service_name: "unknown".into(),
        }
    }
}

impl MonitorConfig {
    /// Check configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.blocking_threshold.is_zero() {
            return Err(ConfigError::ZeroBlockingThreshold);
        }
        if self.critical_threshold < self.blocking_threshold {
            return Err(ConfigError::ThresholdOrder {
                blocking: self.blocking_threshold,
                critical: self.critical_threshold,
            });
        }
        Ok(())
    }
}
