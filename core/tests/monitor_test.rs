// Performance monitor tests: sliding windows, history bounds, subscriptions

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use courier_core::clock::ManualClock;
use courier_core::PerformanceMonitor;

fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    ))
}

// Long sample interval so the background task never interferes with
// deterministic sample_now calls.
fn quiet_monitor(clock: Arc<ManualClock>) -> PerformanceMonitor {
    PerformanceMonitor::with_settings(clock, Duration::from_secs(3600), 100)
}

#[tokio::test]
async fn error_rate_is_zero_without_errors() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    for _ in 0..5 {
        monitor
            .record_message_processed(Duration::from_millis(2))
            .await;
    }

    let metrics = monitor.sample_now().await;
    assert_eq!(metrics.error_rate, 0.0);
    assert_eq!(metrics.total_messages, 5);
    assert_eq!(metrics.total_errors, 0);
}

#[tokio::test]
async fn error_rate_is_zero_when_no_messages_observed() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    monitor.record_error().await;
    monitor.record_error().await;

    // No messages in the window, so no division happens
    let metrics = monitor.sample_now().await;
    assert_eq!(metrics.error_rate, 0.0);
    assert_eq!(metrics.total_errors, 2);
}

#[tokio::test]
async fn error_rate_is_errors_over_messages_in_window() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    monitor
        .record_message_processed(Duration::from_millis(1))
        .await;
    monitor
        .record_message_processed(Duration::from_millis(1))
        .await;
    monitor.record_error().await;

    let metrics = monitor.sample_now().await;
    assert!((metrics.error_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn throughput_derives_from_the_last_minute() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    for _ in 0..60 {
        monitor
            .record_message_processed(Duration::from_millis(1))
            .await;
    }

    let metrics = monitor.sample_now().await;
    assert!((metrics.messages_per_second - 1.0).abs() < f64::EPSILON);

    // Slide past the throughput window: the minute-rate drops to zero while
    // the five-minute error window still sees the messages
    clock.advance(chrono::Duration::seconds(61));
    let metrics = monitor.sample_now().await;
    assert_eq!(metrics.messages_per_second, 0.0);
    assert_eq!(metrics.error_rate, 0.0);
    assert_eq!(metrics.total_messages, 60);
}

#[tokio::test]
async fn average_latency_is_mean_over_window() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    monitor
        .record_message_processed(Duration::from_millis(10))
        .await;
    monitor
        .record_message_processed(Duration::from_millis(30))
        .await;

    let metrics = monitor.sample_now().await;
    assert!((metrics.average_message_latency - 0.020).abs() < 1e-9);
}

#[tokio::test]
async fn history_never_exceeds_cap_and_evicts_oldest() {
    let clock = test_clock();
    let clock_dyn: Arc<dyn courier_core::Clock> = clock.clone();
    let monitor =
        PerformanceMonitor::with_settings(clock_dyn, Duration::from_secs(3600), 3);

    for _ in 0..5 {
        clock.advance(chrono::Duration::seconds(1));
        monitor.sample_now().await;
    }

    let history = monitor.metrics_history().await;
    assert_eq!(history.len(), 3);
    // FIFO eviction: the retained entries are the three newest
    assert!(history[0].timestamp < history[1].timestamp);
    assert!(history[1].timestamp < history[2].timestamp);
    assert_eq!(
        history[2].timestamp,
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 5).unwrap()
    );
    assert_eq!(
        monitor.current_metrics().await.unwrap().timestamp,
        history[2].timestamp
    );
}

#[tokio::test]
async fn resource_usage_stays_in_unit_range() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    let metrics = monitor.sample_now().await;
    assert!((0.0..=1.0).contains(&metrics.cpu_usage));
    assert!((0.0..=1.0).contains(&metrics.memory_usage));
}

#[tokio::test]
async fn start_is_idempotent_and_tracks_uptime() {
    let clock = test_clock();
    let monitor = Arc::new(quiet_monitor(Arc::clone(&clock)));

    Arc::clone(&monitor).start().await;
    Arc::clone(&monitor).start().await; // second call is a no-op

    clock.advance(chrono::Duration::seconds(5));
    let metrics = monitor.sample_now().await;
    assert!((metrics.uptime - 5.0).abs() < f64::EPSILON);

    monitor.stop().await;
}

#[tokio::test]
async fn subscribers_receive_published_snapshots() {
    let clock = test_clock();
    let monitor = quiet_monitor(Arc::clone(&clock));

    let mut rx = monitor.subscribe();
    monitor
        .record_message_processed(Duration::from_millis(1))
        .await;
    let published = monitor.sample_now().await;

    let received = rx.recv().await.unwrap();
    assert_eq!(received.timestamp, published.timestamp);
    assert_eq!(received.total_messages, 1);
}
