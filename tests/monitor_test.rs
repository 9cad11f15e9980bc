//! Integration tests for the event-loop lag monitor.
//!
//! All tests run on a current-thread runtime so that blocking the test
//! body blocks the exact scheduler the monitor is measuring.

mod common;

use common::{spin_block, TestMonitor};
use lagwatch::{HealthStatus, MonitorConfig};
use std::time::Duration;

/// After start() and >= 3 intervals of wall time, at least two probes land.
#[tokio::test]
async fn test_measurements_advance_while_running() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    t.monitor.start();
    assert!(t.monitor.is_running());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = t.monitor.snapshot();
    assert!(
        snapshot.total_measurements >= 2,
        "expected >= 2 measurements after 5 intervals, got {}",
        snapshot.total_measurements
    );

    t.monitor.stop().await;
}

/// reset() zeroes every accumulator while the loop keeps running.
#[tokio::test]
async fn test_reset_zeroes_counters_without_stopping() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    t.monitor.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(t.monitor.snapshot().total_measurements > 0);

    // No await between reset and snapshot: on a current-thread runtime the
    // loop cannot land a measurement in between.
    t.monitor.reset();
    let snapshot = t.monitor.snapshot();
    assert_eq!(snapshot.lag, Duration::ZERO);
    assert_eq!(snapshot.max_lag, Duration::ZERO);
    assert_eq!(snapshot.blocking_events, 0);
    assert_eq!(snapshot.total_measurements, 0);
    assert_eq!(snapshot.utilization, 0.0);

    // The loop is still running: a fresh measurement lands.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(t.monitor.snapshot().total_measurements >= 1);

    t.monitor.stop().await;
}

/// max_lag never decreases between resets, and blocking_events never
/// exceeds total_measurements.
#[tokio::test]
async fn test_max_lag_monotonic_and_counter_invariant() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    t.monitor.start();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let s1 = t.monitor.snapshot();
    assert!(s1.max_lag >= s1.lag);
    assert!(s1.blocking_events <= s1.total_measurements);

    spin_block(Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(60)).await;

    let s2 = t.monitor.snapshot();
    assert!(
        s2.max_lag >= s1.max_lag,
        "max_lag regressed: {:?} -> {:?}",
        s1.max_lag,
        s2.max_lag
    );
    assert!(s2.blocking_events <= s2.total_measurements);
    assert!(s2.utilization >= 0.0 && s2.utilization <= 1.0);

    t.monitor.stop().await;
}

/// Blocking the scheduler for D yields lag >= D - interval, counts a
/// blocking event, and classifies the loop as critical when D exceeds the
/// critical threshold.
#[tokio::test]
async fn test_detects_scheduler_blocking() {
    let config = MonitorConfig {
        interval: Duration::from_millis(50),
        blocking_threshold: Duration::from_millis(20),
        critical_threshold: Duration::from_millis(200),
        service_name: "lagwatch-test".into(),
    };
    let t = TestMonitor::new(config);
    t.monitor.start();

    // Let the loop begin a probe, then stall the runtime thread well past
    // the critical threshold.
    tokio::time::sleep(Duration::from_millis(60)).await;
    spin_block(Duration::from_millis(300));

    // The overdue probe timer fires at the next yield; a short sleep lets
    // the measurement land before we read it.
    tokio::time::sleep(Duration::from_millis(25)).await;

    let snapshot = t.monitor.snapshot();
    assert!(
        snapshot.lag >= Duration::from_millis(200),
        "expected lag >= 200ms after a 300ms stall, got {:?}",
        snapshot.lag
    );
    assert!(
        snapshot.blocking_events >= 1,
        "blocking event not counted: {snapshot:?}"
    );
    assert_eq!(snapshot.status, HealthStatus::Critical);
    assert!(snapshot.max_lag >= snapshot.lag);

    t.monitor.stop().await;
}

/// stop() freezes total_measurements (observable staleness) and start()
/// resumes counting from where it left off.
#[tokio::test]
async fn test_stop_halts_and_start_resumes() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    t.monitor.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    t.monitor.stop().await;
    assert!(!t.monitor.is_running());

    let frozen = t.monitor.snapshot().total_measurements;
    assert!(frozen >= 2);

    // Monitoring has stopped advancing: the counter stays frozen.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.monitor.snapshot().total_measurements, frozen);

    // Restart resumes measurement without resetting counters.
    t.monitor.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(t.monitor.snapshot().total_measurements > frozen);

    t.monitor.stop().await;
}

/// A second start() while running is a no-op: after one stop() nothing
/// keeps measuring.
#[tokio::test]
async fn test_start_is_idempotent() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    t.monitor.start();
    t.monitor.start();

    tokio::time::sleep(Duration::from_millis(60)).await;
    t.monitor.stop().await;

    let frozen = t.monitor.snapshot().total_measurements;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        t.monitor.snapshot().total_measurements,
        frozen,
        "a leaked second sampling loop kept measuring after stop()"
    );
}

/// stop() is idempotent and safe without a prior start().
#[tokio::test]
async fn test_stop_is_idempotent() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    t.monitor.stop().await;

    t.monitor.start();
    tokio::time::sleep(Duration::from_millis(40)).await;
    t.monitor.stop().await;
    t.monitor.stop().await;
    assert!(!t.monitor.is_running());
}

/// snapshot() is safe from many concurrent readers while the loop writes.
#[tokio::test]
async fn test_concurrent_snapshot_readers() {
    let t = TestMonitor::new(TestMonitor::fast_config());
    let monitor = std::sync::Arc::new(t);
    monitor.monitor.start();

    let readers = (0..4).map(|_| {
        let m = std::sync::Arc::clone(&monitor);
        tokio::spawn(async move {
            for _ in 0..50 {
                let snapshot = m.monitor.snapshot();
                assert!(snapshot.max_lag >= snapshot.lag);
                assert!(snapshot.blocking_events <= snapshot.total_measurements);
                tokio::task::yield_now().await;
            }
        })
    });
    let results = futures::future::join_all(readers).await;
    assert!(results.into_iter().all(|r| r.is_ok()));

    monitor.monitor.stop().await;
}
