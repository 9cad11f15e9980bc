//! Shared test helpers.

use lagwatch::observability::metrics::build_meter_provider;
use lagwatch::{LagMonitor, MonitorConfig};
use opentelemetry::metrics::MeterProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::{Duration, Instant};

/// A monitor wired to a record-only meter provider.
///
/// The provider must stay alive for the duration of the test: the
/// monitor's gauge callbacks are registered on it.
pub struct TestMonitor {
    pub monitor: LagMonitor,
    _provider: SdkMeterProvider,
}

impl TestMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        lagwatch::observability::tracing::init_test_tracing();
        let provider = build_meter_provider(None);
        let meter = provider.meter("lagwatch-test");
        let monitor = LagMonitor::new(config, &meter).expect("valid test config");
        Self {
            monitor,
            _provider: provider,
        }
    }

    /// A fast-probing configuration so tests stay short.
    pub fn fast_config() -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_millis(20),
            blocking_threshold: Duration::from_millis(10),
            critical_threshold: Duration::from_millis(200),
            service_name: "lagwatch-test".into(),
        }
    }
}

/// Occupy the current thread with CPU work for `duration`.
///
/// On a current-thread runtime this stalls the scheduler the monitor is
/// measuring, which is exactly the condition under test.
pub fn spin_block(duration: Duration) {
    let deadline = Instant::now() + duration;
    let mut acc: u64 = 0;
    while Instant::now() < deadline {
        acc = acc.wrapping_add(1);
    }
    std::hint::black_box(acc);
}
