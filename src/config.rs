//! Configuration parsing for the lagwatch demo binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::time::Duration;

use crate::monitor::MonitorConfig;

/// Lagwatch: event-loop lag and health monitoring for Tokio services.
#[derive(Parser, Debug, Clone)]
#[command(name = "lagwatch")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Probe interval in milliseconds
    #[arg(long, env = "LAGWATCH_INTERVAL_MS", default_value_t = 100)]
    pub interval_ms: u64,

    /// Lag above this (in milliseconds) counts as a blocking event
    #[arg(long, env = "LAGWATCH_BLOCKING_THRESHOLD_MS", default_value_t = 50)]
    pub blocking_threshold_ms: u64,

    /// Lag above this (in milliseconds) is classified as critical
    #[arg(long, env = "LAGWATCH_CRITICAL_THRESHOLD_MS", default_value_t = 500)]
    pub critical_threshold_ms: u64,

    /// Service name attached to exported metrics
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "lagwatch-demo")]
    pub service_name: String,

    /// How often to log a health snapshot, in seconds
    #[arg(long, env = "LAGWATCH_SNAPSHOT_PERIOD_SECS", default_value_t = 5)]
    pub snapshot_period_secs: u64,

    /// Periodically block the runtime thread to demonstrate lag detection
    #[arg(long, env = "LAGWATCH_DEMO_BLOCKING")]
    pub demo_blocking: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Convert the CLI values into a monitor configuration.
    ///
    /// Validation happens in [`crate::LagMonitor::new`], not here.
    #[must_use]
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_millis(self.interval_ms),
            blocking_threshold: Duration::from_millis(self.blocking_threshold_ms),
            critical_threshold: Duration::from_millis(self.critical_threshold_ms),
            service_name: self.service_name.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            blocking_threshold_ms: 50,
            critical_threshold_ms: 500,
            service_name: "lagwatch-demo".into(),
            snapshot_period_secs: 5,
            demo_blocking: false,
            log_level: "info".into(),
            otel_endpoint: None,
        }
    }
}
