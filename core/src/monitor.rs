// Performance monitor: periodic sampling of throughput, latency and resource usage
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Throughput and latency derive from messages observed in the last minute
const THROUGHPUT_WINDOW_SECS: i64 = 60;
/// Error rate derives from errors and messages observed in the last five minutes
const ERROR_WINDOW_SECS: i64 = 300;

/// Immutable metrics snapshot published on every sampling tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub timestamp: DateTime<Utc>,
    /// Host CPU usage, 0.0 to 1.0
    pub cpu_usage: f64,
    /// Host memory usage, 0.0 to 1.0
    pub memory_usage: f64,
    pub messages_per_second: f64,
    /// Mean handling latency over the throughput window, in seconds
    pub average_message_latency: f64,
    /// Errors divided by messages over the error window, 0.0 to 1.0
    pub error_rate: f64,
    /// Seconds since the monitor started
    pub uptime: f64,
    pub total_messages: u64,
    pub total_errors: u64,
}

/// Samples system counters on a fixed interval and retains bounded history.
///
/// Counters are fed by the orchestrator's send path
/// (`record_message_processed` / `record_error`); CPU and memory come from
/// host sampling. Each snapshot is appended to history (oldest evicted past
/// the cap) and pushed to subscribers as an owned copy, never a shared
/// reference.
pub struct PerformanceMonitor {
    clock: Arc<dyn Clock>,
    sample_interval: Duration,
    history_cap: usize,
    started_at: RwLock<Option<DateTime<Utc>>>,
    /// (processed_at, latency_secs), pruned to the error window
    messages: Mutex<VecDeque<(DateTime<Utc>, f64)>>,
    errors: Mutex<VecDeque<DateTime<Utc>>>,
    total_messages: AtomicU64,
    total_errors: AtomicU64,
    history: RwLock<VecDeque<PerformanceMetrics>>,
    metrics_tx: broadcast::Sender<PerformanceMetrics>,
    sampler: Mutex<Option<JoinHandle<()>>>,
    system: Mutex<System>,
}

impl PerformanceMonitor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(clock, DEFAULT_SAMPLE_INTERVAL, DEFAULT_HISTORY_CAP)
    }

    pub fn with_settings(
        clock: Arc<dyn Clock>,
        sample_interval: Duration,
        history_cap: usize,
    ) -> Self {
        let (metrics_tx, _) = broadcast::channel(64);
        Self {
            clock,
            sample_interval,
            history_cap,
            started_at: RwLock::new(None),
            messages: Mutex::new(VecDeque::new()),
            errors: Mutex::new(VecDeque::new()),
            total_messages: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
            metrics_tx,
            sampler: Mutex::new(None),
            system: Mutex::new(System::new()),
        }
    }

    /// Begin periodic sampling. A no-op while a sampler is already running.
    pub async fn start(self: Arc<Self>) {
        let mut sampler = self.sampler.lock().await;
        if let Some(handle) = sampler.as_ref() {
            if !handle.is_finished() {
                debug!("performance monitor already running");
                return;
            }
        }

        {
            let mut started = self.started_at.write().await;
            if started.is_none() {
                *started = Some(self.clock.now());
            }
        }

        let monitor = Arc::clone(&self);
        let period = self.sample_interval;
        *sampler = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so samples are spaced
            // one full interval apart.
            interval.tick().await;
            loop {
                interval.tick().await;
                monitor.sample_now().await;
            }
        }));

        info!(interval_ms = period.as_millis() as u64, "performance monitor started");
    }

    /// Halt periodic sampling
    pub async fn stop(&self) {
        let mut sampler = self.sampler.lock().await;
        if let Some(handle) = sampler.take() {
            handle.abort();
            info!("performance monitor stopped");
        }
    }

    /// Record one handled message and its end-to-end handling latency
    pub async fn record_message_processed(&self, latency: Duration) {
        let now = self.clock.now();
        let mut messages = self.messages.lock().await;
        messages.push_back((now, latency.as_secs_f64()));
        prune_messages(&mut messages, now);
        drop(messages);
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one observed error
    pub async fn record_error(&self) {
        let now = self.clock.now();
        let mut errors = self.errors.lock().await;
        errors.push_back(now);
        prune_errors(&mut errors, now);
        drop(errors);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Compute a snapshot from the current counters, append it to history and
    /// publish it to subscribers. The sampling task calls this on every tick;
    /// tests may call it directly.
    pub async fn sample_now(&self) -> PerformanceMetrics {
        let now = self.clock.now();

        let (throughput_count, average_message_latency, messages_in_error_window) = {
            let mut messages = self.messages.lock().await;
            prune_messages(&mut messages, now);
            let cutoff = now - chrono::Duration::seconds(THROUGHPUT_WINDOW_SECS);
            let mut count = 0usize;
            let mut latency_sum = 0.0f64;
            for (at, latency) in messages.iter() {
                if *at >= cutoff {
                    count += 1;
                    latency_sum += latency;
                }
            }
            let average = if count == 0 { 0.0 } else { latency_sum / count as f64 };
            (count, average, messages.len())
        };

        let errors_in_window = {
            let mut errors = self.errors.lock().await;
            prune_errors(&mut errors, now);
            errors.len()
        };

        let error_rate = if messages_in_error_window == 0 {
            0.0
        } else {
            (errors_in_window as f64 / messages_in_error_window as f64).min(1.0)
        };

        let (cpu_usage, memory_usage) = {
            let mut system = self.system.lock().await;
            system.refresh_cpu_usage();
            system.refresh_memory();
            let cpu = (system.global_cpu_info().cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
            let total = system.total_memory();
            let memory = if total == 0 {
                0.0
            } else {
                (system.used_memory() as f64 / total as f64).clamp(0.0, 1.0)
            };
            (cpu, memory)
        };

        let uptime = match *self.started_at.read().await {
            Some(started) => (now - started).num_milliseconds().max(0) as f64 / 1000.0,
            None => 0.0,
        };

        let snapshot = PerformanceMetrics {
            timestamp: now,
            cpu_usage,
            memory_usage,
            messages_per_second: throughput_count as f64 / THROUGHPUT_WINDOW_SECS as f64,
            average_message_latency,
            error_rate,
            uptime,
            total_messages: self.total_messages.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
        };

        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_cap {
                history.pop_front();
            }
            history.push_back(snapshot.clone());
        }

        // Lagging or absent subscribers must not stall sampling
        let _ = self.metrics_tx.send(snapshot.clone());

        debug!(
            messages_per_second = snapshot.messages_per_second,
            error_rate = snapshot.error_rate,
            "metrics sampled"
        );
        snapshot
    }

    /// Latest snapshot, if any tick has run
    pub async fn current_metrics(&self) -> Option<PerformanceMetrics> {
        self.history.read().await.back().cloned()
    }

    /// Full retained history, oldest first
    pub async fn metrics_history(&self) -> Vec<PerformanceMetrics> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Receive every snapshot published from here on
    pub fn subscribe(&self) -> broadcast::Receiver<PerformanceMetrics> {
        self.metrics_tx.subscribe()
    }
}

fn prune_messages(messages: &mut VecDeque<(DateTime<Utc>, f64)>, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::seconds(ERROR_WINDOW_SECS);
    while matches!(messages.front(), Some((at, _)) if *at < cutoff) {
        messages.pop_front();
    }
}

fn prune_errors(errors: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::seconds(ERROR_WINDOW_SECS);
    while matches!(errors.front(), Some(at) if *at < cutoff) {
        errors.pop_front();
    }
}
