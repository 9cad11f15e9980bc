//! The lag sampling loop.
//!
//! One background task per monitor. Each iteration requests a sleep of
//! `interval` and measures the actual suspension time; the excess is the
//! scheduler lag for that probe. Because the task runs on the scheduler it
//! measures, any work that blocks the loop delays the task's resumption by
//! the same amount.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::{HealthSnapshot, HealthStatus, LoopStats};
use super::{ConfigError, MonitorConfig};

/// Synchronous instruments fed by the sampling loop.
///
/// The observable gauges are registered separately; their callbacks read
/// the shared state directly when the exporter collects.
#[derive(Clone)]
struct Instruments {
    blocking_events: Counter<u64>,
    lag_distribution: Histogram<f64>,
    request_wait: Histogram<f64>,
    request_execution: Histogram<f64>,
}

impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            blocking_events: meter
                .u64_counter("eventloop.blocking_events")
                .with_description("Count of probes whose lag exceeded the blocking threshold")
                .with_unit("{events}")
                .init(),
            lag_distribution: meter
                .f64_histogram("eventloop.lag_distribution")
                .with_description("Distribution of event loop lag measurements")
                .with_unit("s")
                .init(),
            request_wait: meter
                .f64_histogram("eventloop.request.wait_time")
                .with_description("Per-request time spent waiting to acquire the event loop")
                .with_unit("s")
                .init(),
            request_execution: meter
                .f64_histogram("eventloop.request.execution_time")
                .with_description("Per-request time spent executing on the event loop")
                .with_unit("s")
                .init(),
        }
    }
}

/// Register the observable gauges that report live state at collection
/// time. Registration outlives the returned instrument handles.
fn register_gauges(meter: &Meter, shared: &Arc<Mutex<LoopStats>>, attrs: Vec<KeyValue>) {
    let state = Arc::clone(shared);
    let gauge_attrs = attrs.clone();
    meter
        .f64_observable_gauge("eventloop.lag")
        .with_description("Scheduler lag observed by the most recent probe")
        .with_unit("s")
        .with_callback(move |observer| {
            observer.observe(lock_stats(&state).lag.as_secs_f64(), &gauge_attrs);
        })
        .init();

    let state = Arc::clone(shared);
    let gauge_attrs = attrs.clone();
    meter
        .f64_observable_gauge("eventloop.max_lag")
        .with_description("Maximum scheduler lag observed since start or reset")
        .with_unit("s")
        .with_callback(move |observer| {
            observer.observe(lock_stats(&state).max_lag.as_secs_f64(), &gauge_attrs);
        })
        .init();

    let state = Arc::clone(shared);
    let gauge_attrs = attrs.clone();
    meter
        .f64_observable_gauge("eventloop.utilization")
        .with_description("Fraction of elapsed time the event loop was busy (0-1)")
        .with_unit("1")
        .with_callback(move |observer| {
            observer.observe(lock_stats(&state).utilization, &gauge_attrs);
        })
        .init();

    let state = Arc::clone(shared);
    meter
        .u64_observable_gauge("eventloop.active_tasks")
        .with_description("Alive runtime tasks at the most recent probe")
        .with_unit("{tasks}")
        .with_callback(move |observer| {
            observer.observe(lock_stats(&state).active_tasks as u64, &attrs);
        })
        .init();
}

/// The running half of a started monitor.
struct Runner {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Event-loop lag monitor.
///
/// Construct one per process, thread it through your lifecycle hooks, and
/// call [`start`](Self::start) at worker startup and
/// [`stop`](Self::stop) at graceful shutdown. All readers go through
/// [`snapshot`](Self::snapshot); the sampling loop is the sole writer.
///
/// The lifecycle is exactly not-started / running / stopped, and the
/// monitor is restartable: `stop` followed by `start` resumes measurement
/// with counters intact unless [`reset`](Self::reset) was called.
pub struct LagMonitor {
    config: MonitorConfig,
    shared: Arc<Mutex<LoopStats>>,
    instruments: Instruments,
    attrs: Vec<KeyValue>,
    runner: Mutex<Option<Runner>>,
}

impl LagMonitor {
    /// Create a monitor and register its metric instruments on `meter`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid. Nothing
    /// is registered on the meter in that case.
    pub fn new(config: MonitorConfig, meter: &Meter) -> Result<Self, ConfigError> {
        config.validate()?;

        let shared = Arc::new(Mutex::new(LoopStats::default()));
        let attrs = vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )];
        register_gauges(meter, &shared, attrs.clone());

        Ok(Self {
            config,
            shared,
            instruments: Instruments::new(meter),
            attrs,
            runner: Mutex::new(None),
        })
    }

    /// Start the sampling loop.
    ///
    /// Idempotent: calling while already running is a no-op. Does not
    /// block; the loop is spawned onto the current Tokio runtime, so this
    /// must be called from within one.
    pub fn start(&self) {
        let mut runner = lock_runner(&self.runner);
        if let Some(active) = runner.as_ref() {
            if !active.handle.is_finished() {
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sample_loop(
            Arc::clone(&self.shared),
            self.instruments.clone(),
            self.config.clone(),
            self.attrs.clone(),
            cancel.clone(),
        ));
        *runner = Some(Runner { cancel, handle });

        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            blocking_threshold_ms = self.config.blocking_threshold.as_millis() as u64,
            critical_threshold_ms = self.config.critical_threshold.as_millis() as u64,
            "event loop monitor started"
        );
    }

    /// Stop the sampling loop and wait for it to terminate.
    ///
    /// Idempotent. The loop observes cancellation within one interval and
    /// no partial probe is left dangling. After this returns the loop will
    /// not run again until the next [`start`](Self::start).
    pub async fn stop(&self) {
        let runner = lock_runner(&self.runner).take();
        let Some(Runner { cancel, handle }) = runner else {
            return;
        };

        cancel.cancel();
        if let Err(err) = handle.await {
            // Join failures are logged, never propagated; stop() must
            // always succeed from the caller's point of view.
            tracing::warn!(error = %err, "event loop monitor task ended abnormally");
        }
        tracing::info!("event loop monitor stopped");
    }

    /// Whether the sampling loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock_runner(&self.runner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Immutable copy of the current health state.
    ///
    /// Never suspends and never blocks on the sampling loop beyond a
    /// sub-millisecond critical section; safe to call from any number of
    /// concurrent readers. Two consecutive snapshots may be identical if
    /// no new measurement landed in between.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let stats = lock_stats(&self.shared);
        HealthSnapshot {
            lag: stats.lag,
            max_lag: stats.max_lag,
            active_tasks: stats.active_tasks,
            utilization: stats.utilization,
            blocking_events: stats.blocking_events,
            total_measurements: stats.total_measurements,
            status: HealthStatus::classify(
                stats.lag,
                self.config.blocking_threshold,
                self.config.critical_threshold,
            ),
        }
    }

    /// Zero all accumulators without stopping the sampling loop.
    pub fn reset(&self) {
        *lock_stats(&self.shared) = LoopStats::default();
        tracing::debug!("event loop monitor statistics reset");
    }

    /// Attribute request-level wait and execution time to the event loop.
    ///
    /// Pure recording into the request histograms; no control-flow effect.
    /// Intended for HTTP middleware that wants to enrich request spans
    /// with loop health, called after the response is produced.
    pub fn record_request_timing(
        &self,
        wait: Duration,
        execution: Duration,
        endpoint: &str,
        extra_attrs: &[KeyValue],
    ) {
        let mut attrs = self.attrs.clone();
        attrs.push(KeyValue::new("endpoint", endpoint.to_string()));
        attrs.extend_from_slice(extra_attrs);

        self.instruments.request_wait.record(wait.as_secs_f64(), &attrs);
        self.instruments
            .request_execution
            .record(execution.as_secs_f64(), &attrs);
    }

    /// The configuration this monitor was built with.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

/// Lock the stats mutex, recovering from poisoning.
///
/// The critical sections here never panic, but a reader must not be taken
/// down by a poisoned lock either way.
fn lock_stats(stats: &Mutex<LoopStats>) -> MutexGuard<'_, LoopStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_runner(runner: &Mutex<Option<Runner>>) -> MutexGuard<'_, Option<Runner>> {
    runner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The sampling loop itself.
///
/// Cancellation is the only way out and always honored; every other
/// per-probe hiccup is swallowed so monitoring can never crash the host.
async fn sample_loop(
    shared: Arc<Mutex<LoopStats>>,
    instruments: Instruments,
    config: MonitorConfig,
    attrs: Vec<KeyValue>,
    cancel: CancellationToken,
) {
    loop {
        let start = Instant::now();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.interval) => {}
        }

        let elapsed = start.elapsed();
        let lag = elapsed.saturating_sub(config.interval);

        // Task enumeration is unavailable outside a runtime context; a
        // failed probe detail keeps the previous value and the loop moves on.
        let active_tasks = tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| handle.metrics().num_alive_tasks());

        let is_blocking = {
            let mut stats = lock_stats(&shared);
            stats.lag = lag;
            stats.max_lag = stats.max_lag.max(lag);
            stats.total_measurements += 1;
            if let Some(count) = active_tasks {
                stats.active_tasks = count;
            }
            stats.busy_time += lag;
            stats.total_time += config.interval;
            if !stats.total_time.is_zero() {
                stats.utilization =
                    (stats.busy_time.as_secs_f64() / stats.total_time.as_secs_f64()).min(1.0);
            }
            if lag > config.blocking_threshold {
                stats.blocking_events += 1;
                true
            } else {
                false
            }
        };

        instruments
            .lag_distribution
            .record(lag.as_secs_f64(), &attrs);

        if is_blocking {
            let severity = if lag > config.critical_threshold {
                "critical"
            } else {
                "warning"
            };
            let mut event_attrs = attrs.clone();
            event_attrs.push(KeyValue::new("blocking.severity", severity));
            instruments.blocking_events.add(1, &event_attrs);

            if lag > config.critical_threshold {
                tracing::warn!(
                    lag_ms = lag.as_millis() as u64,
                    "event loop blocked beyond critical threshold"
                );
            } else {
                tracing::debug!(lag_ms = lag.as_millis() as u64, "event loop blocking detected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};

    fn test_meter() -> (SdkMeterProvider, Meter) {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let meter = provider.meter("lagwatch-test");
        (provider, meter)
    }

    #[test]
    fn test_new_registers_instruments() {
        let (_provider, meter) = test_meter();
        let monitor = LagMonitor::new(MonitorConfig::default(), &meter).unwrap();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let (_provider, meter) = test_meter();
        let config = MonitorConfig {
            interval: Duration::ZERO,
            ..MonitorConfig::default()
        };
        assert_eq!(
            LagMonitor::new(config, &meter).err(),
            Some(ConfigError::ZeroInterval)
        );
    }

    #[test]
    fn test_snapshot_starts_zeroed_and_healthy() {
        let (_provider, meter) = test_meter();
        let monitor = LagMonitor::new(MonitorConfig::default(), &meter).unwrap();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.lag, Duration::ZERO);
        assert_eq!(snapshot.max_lag, Duration::ZERO);
        assert_eq!(snapshot.blocking_events, 0);
        assert_eq!(snapshot.total_measurements, 0);
        assert_eq!(snapshot.utilization, 0.0);
        assert_eq!(snapshot.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_record_request_timing_accepts_attributes() {
        let (_provider, meter) = test_meter();
        let monitor = LagMonitor::new(MonitorConfig::default(), &meter).unwrap();

        // Pure recording; must not panic or touch loop state.
        monitor.record_request_timing(
            Duration::from_millis(3),
            Duration::from_millis(42),
            "/orders",
            &[KeyValue::new("http.method", "GET")],
        );
        assert_eq!(monitor.snapshot().total_measurements, 0);
    }

    #[test]
    fn test_stop_without_start_is_a_noop() {
        let (_provider, meter) = test_meter();
        let monitor = LagMonitor::new(MonitorConfig::default(), &meter).unwrap();
        tokio_test::block_on(monitor.stop());
        assert!(!monitor.is_running());
    }
}
