//! Lagwatch: event-loop lag and health monitoring for Tokio services.
//!
//! Lagwatch runs a background task inside the very scheduler it measures:
//! it requests a fixed-length sleep and compares the requested duration
//! against the actual elapsed time. Any excess is scheduler lag, a direct
//! proxy for how blocked the event loop is. Statistics derived from the
//! probes (lag, max lag, utilization, blocking events) are exported as
//! OpenTelemetry metrics and available as point-in-time snapshots.
//!
//! # Architecture
//!
//! - **Self-measurement**: the monitor task is delayed by exactly the same
//!   contention it reports, so no external probe is needed
//! - **Single writer, many readers**: the sampling loop is the sole mutator;
//!   [`LagMonitor::snapshot`] hands out immutable copies
//! - **Non-fatal by design**: nothing in the sampling loop can crash or
//!   stall the host process; a stopped monitor is observable only as a
//!   frozen `total_measurements`
//! - **Observable**: OpenTelemetry gauges, counters, and histograms
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration for the demo binary
//! - [`monitor`]: the lag sampling loop, health state, and snapshots
//! - [`observability`]: meter provider and tracing setup
//!
//! # Example
//!
//! ```no_run
//! use lagwatch::{LagMonitor, MonitorConfig};
//! use opentelemetry::metrics::MeterProvider;
//!
//! # async fn demo() -> Result<(), lagwatch::ConfigError> {
//! let provider = lagwatch::observability::metrics::build_meter_provider(None);
//! let meter = provider.meter("my-service");
//! let monitor = LagMonitor::new(MonitorConfig::default(), &meter)?;
//! monitor.start();
//! // ... serve traffic ...
//! let health = monitor.snapshot();
//! println!("lag: {:?}", health.lag);
//! monitor.stop().await;
//! # Ok(())
//! # }
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // monitor::MonitorConfig is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::cast_possible_truncation // Millisecond counts fit in u64
)]

pub mod config;
pub mod monitor;
pub mod observability;

pub use monitor::{ConfigError, HealthSnapshot, HealthStatus, LagMonitor, MonitorConfig};
