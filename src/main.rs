//! Lagwatch demo: run the event-loop monitor and log health snapshots.
//!
//! # Usage
//!
//! ```bash
//! lagwatch --interval-ms 100 --blocking-threshold-ms 50 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `LAGWATCH_INTERVAL_MS`: Probe interval in milliseconds
//! - `LAGWATCH_DEMO_BLOCKING`: Periodically block the loop to show detection
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! The demo runs on a current-thread runtime so that induced blocking is
//! guaranteed to stall the same scheduler the monitor measures.

use std::time::{Duration, Instant};

use lagwatch::config::Config;
use lagwatch::observability::metrics::build_meter_provider;
use lagwatch::observability::tracing::init_tracing;
use lagwatch::LagMonitor;
use opentelemetry::metrics::MeterProvider;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r"
   _                              _       _
  | | __ _  __ ___      ____ _| |_ ___| |__
  | |/ _` |/ _` \ \ /\ / / _` | __/ __| '_ \
  | | (_| | (_| |\ V  V / (_| | || (__| | | |
  |_|\__,_|\__, | \_/\_/ \__,_|\__\___|_| |_|
           |___/

  Lagwatch v{} - Event Loop Monitor

  Configuration:
    Interval:            {} ms
    Blocking threshold:  {} ms
    Critical threshold:  {} ms
    Service:             {}
    Demo blocking:       {}

  Press Ctrl+C to shutdown gracefully.
",
        version,
        config.interval_ms,
        config.blocking_threshold_ms,
        config.critical_threshold_ms,
        config.service_name,
        config.demo_blocking,
    );
}

/// Occupy the runtime thread with CPU work for `duration`.
///
/// Deliberately bad behavior: this is what the monitor exists to detect.
fn spin_block(duration: Duration) {
    let deadline = Instant::now() + duration;
    let mut acc: u64 = 0;
    while Instant::now() < deadline {
        acc = acc.wrapping_add(1);
    }
    std::hint::black_box(acc);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    // Build the meter provider (with optional OTLP export) and the monitor
    let provider = build_meter_provider(config.otel_endpoint.as_deref());
    let meter = provider.meter("lagwatch");
    let monitor = LagMonitor::new(config.monitor_config(), &meter)?;
    monitor.start();

    print_banner(&config);

    // Create shutdown signal channel
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
        // Wait for SIGTERM or SIGINT (Ctrl+C)
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("failed to listen for ctrl+c");
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx.send(true);
    });

    // Log a health snapshot every period until shutdown
    let mut ticker = tokio::time::interval(Duration::from_secs(config.snapshot_period_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                let snapshot = monitor.snapshot();
                if let Ok(json) = serde_json::to_string(&snapshot) {
                    tracing::info!(health = %json, "event loop health");
                }

                // Every other tick, stall the loop long enough to trip the
                // critical threshold so the detection path is visible.
                ticks += 1;
                if config.demo_blocking && ticks % 2 == 0 {
                    tracing::info!("demo: blocking the event loop for 600ms");
                    spin_block(Duration::from_millis(600));
                }
            }
        }
    }

    monitor.stop().await;
    provider.shutdown()?;

    tracing::info!("Lagwatch shutdown complete");
    Ok(())
}
