// Framework orchestrator: top-level façade wiring queue, security, monitor and engine
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::FrameworkConfig;
use crate::coordination::{Channel, CoordinationEngine, RoutingFault};
use crate::message::Message;
use crate::monitor::{PerformanceMetrics, PerformanceMonitor};
use crate::queue::MessageQueue;
use crate::security::{SecurityEvent, SecurityManager};
use crate::{CourierError, Result};

/// Derived health snapshot, recomputed on every heartbeat tick.
///
/// Healthy means at least one active agent and a queue below the configured
/// maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub is_healthy: bool,
    pub active_agents: usize,
    pub queue_size: usize,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub average_message_latency: f64,
    pub error_rate: f64,
    /// Monotonic count of faults observed on the engine's error stream
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

struct AgentRecord {
    agent: Arc<dyn Agent>,
    status: AgentStatus,
    #[allow(dead_code)]
    registered_at: DateTime<Utc>,
}

/// Top-level façade over the communication core.
///
/// Owns the agent registry, the message queue, the bounded communication log
/// and the health snapshot; wires the security manager, performance monitor
/// and coordination engine together. Every mutating operation requires
/// `initialize` to have completed first.
///
/// The send path is: security validation, priority enqueue, dequeue of the
/// most urgent pending message, routing to the recipient agent. Failures on
/// that path are returned to the caller; handler failures additionally reach
/// the fault observer, which folds them into the health snapshot without ever
/// terminating the process.
pub struct Orchestrator {
    config: FrameworkConfig,
    clock: Arc<dyn Clock>,
    security: Arc<SecurityManager>,
    monitor: Arc<PerformanceMonitor>,
    engine: Arc<CoordinationEngine>,
    queue: Arc<MessageQueue>,
    agents: Arc<DashMap<String, AgentRecord>>,
    comm_log: Arc<RwLock<VecDeque<Message>>>,
    health: Arc<RwLock<SystemHealth>>,
    error_count: Arc<AtomicU64>,
    last_error: Arc<RwLock<Option<String>>>,
    initialized: AtomicBool,
    fault_rx: Mutex<Option<mpsc::UnboundedReceiver<RoutingFault>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: FrameworkConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: FrameworkConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let security = Arc::new(SecurityManager::new(
            config.security_level,
            Arc::clone(&clock),
        ));
        let monitor = Arc::new(PerformanceMonitor::new(Arc::clone(&clock)));
        let (engine, fault_rx) = CoordinationEngine::new(Arc::clone(&clock));

        let health = SystemHealth {
            is_healthy: false,
            active_agents: 0,
            queue_size: 0,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            average_message_latency: 0.0,
            error_rate: 0.0,
            error_count: 0,
            last_error: None,
            last_updated: clock.now(),
        };

        Ok(Self {
            config,
            clock,
            security,
            monitor,
            engine: Arc::new(engine),
            queue: Arc::new(MessageQueue::new()),
            agents: Arc::new(DashMap::new()),
            comm_log: Arc::new(RwLock::new(VecDeque::new())),
            health: Arc::new(RwLock::new(health)),
            error_count: Arc::new(AtomicU64::new(0)),
            last_error: Arc::new(RwLock::new(None)),
            initialized: AtomicBool::new(false),
            fault_rx: Mutex::new(Some(fault_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Bring the framework up: engine, monitor, heartbeat loop and fault
    /// observer. Calling again while initialized is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("framework already initialized");
            return Ok(());
        }

        self.engine.initialize();
        if self.config.performance_monitoring {
            Arc::clone(&self.monitor).start().await;
        }

        let mut tasks = self.tasks.lock().await;

        // Heartbeat loop: recompute the health snapshot every interval
        {
            let agents = Arc::clone(&self.agents);
            let queue = Arc::clone(&self.queue);
            let monitor = Arc::clone(&self.monitor);
            let health = Arc::clone(&self.health);
            let error_count = Arc::clone(&self.error_count);
            let last_error = Arc::clone(&self.last_error);
            let clock = Arc::clone(&self.clock);
            let max_queue_size = self.config.max_queue_size;
            let period = self.config.heartbeat_interval;
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let snapshot = compute_health(
                        &agents,
                        &queue,
                        &monitor,
                        max_queue_size,
                        &error_count,
                        &last_error,
                        clock.now(),
                    )
                    .await;
                    *health.write().await = snapshot;
                }
            }));
        }

        // Fault observer: errors surfaced by the engine are reported, never fatal
        if let Some(mut fault_rx) = self.fault_rx.lock().await.take() {
            let error_count = Arc::clone(&self.error_count);
            let last_error = Arc::clone(&self.last_error);
            let health = Arc::clone(&self.health);
            tasks.push(tokio::spawn(async move {
                while let Some(fault) = fault_rx.recv().await {
                    warn!(
                        message_id = %fault.message_id,
                        receiver_id = %fault.receiver_id,
                        detail = %fault.detail,
                        "routing fault reported"
                    );
                    let count = error_count.fetch_add(1, Ordering::Relaxed) + 1;
                    *last_error.write().await = Some(fault.detail.clone());
                    let mut health = health.write().await;
                    health.error_count = count;
                    health.last_error = Some(fault.detail);
                }
            }));
        }
        drop(tasks);

        self.refresh_health().await;
        info!("framework initialized");
        Ok(())
    }

    /// Validate an agent with the security manager, add it to the registry
    /// and activate it in the coordination engine.
    ///
    /// # Errors
    ///
    /// `ResourceExhausted` once `max_agents` agents are active,
    /// `SecurityViolation` if the agent is blocked.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        self.ensure_initialized()?;

        if self.active_agent_count() >= self.config.max_agents {
            return Err(CourierError::ResourceExhausted(format!(
                "agent limit reached ({})",
                self.config.max_agents
            )));
        }

        self.security.validate_agent(agent.as_ref()).await?;
        self.engine.register_agent(Arc::clone(&agent)).await?;

        let agent_id = agent.id().to_string();
        self.agents.insert(
            agent_id.clone(),
            AgentRecord {
                agent,
                status: AgentStatus::Active,
                registered_at: self.clock.now(),
            },
        );
        info!(agent_id = %agent_id, "agent registered");
        Ok(())
    }

    /// Deactivate an agent and drop it from the registry
    pub async fn remove_agent(&self, agent_id: &str) -> Result<()> {
        self.ensure_initialized()?;

        if !self.agents.contains_key(agent_id) {
            return Err(CourierError::AgentNotFound(agent_id.to_string()));
        }
        self.engine.unregister_agent(agent_id).await?;
        self.agents.remove(agent_id);
        info!(agent_id = %agent_id, "agent removed");
        Ok(())
    }

    /// Validate, enqueue and route a message, then append it to the
    /// communication log.
    ///
    /// The message actually routed is the most urgent one pending, which
    /// under concurrent senders is not necessarily the one passed in.
    pub async fn send_message(&self, message: Message) -> Result<()> {
        self.ensure_initialized()?;
        self.security.validate_message(&message).await?;

        self.queue.enqueue(message).await;
        let Some(next) = self.queue.dequeue().await else {
            // A concurrent sender drained the queue for us
            return Ok(());
        };

        let started = Instant::now();
        match self.engine.route_message(next.clone()).await {
            Ok(()) => {
                self.monitor.record_message_processed(started.elapsed()).await;
                self.append_log(next).await;
                Ok(())
            }
            Err(e) => {
                self.monitor.record_error().await;
                Err(e)
            }
        }
    }

    /// Send an individually addressed copy of `message` to every active
    /// agent.
    ///
    /// Best-effort fan-out: every recipient is attempted, each copy is
    /// validated and routed independently, and failures are aggregated into a
    /// single `CommunicationFailure` returned after the last attempt. Returns
    /// the number of recipients reached.
    pub async fn broadcast_message(&self, message: Message) -> Result<usize> {
        self.ensure_initialized()?;

        let recipients: Vec<String> = self
            .agents
            .iter()
            .filter(|entry| entry.value().status == AgentStatus::Active)
            .map(|entry| entry.key().clone())
            .collect();

        let mut delivered = 0usize;
        let mut failures = Vec::new();
        for receiver_id in &recipients {
            let copy = message.readdressed(receiver_id, self.clock.now());
            match self.send_message(copy).await {
                Ok(()) => delivered += 1,
                Err(e) => failures.push(format!("{}: {}", receiver_id, e)),
            }
        }

        if failures.is_empty() {
            debug!(recipients = delivered, "broadcast delivered");
            Ok(delivered)
        } else {
            Err(CourierError::CommunicationFailure(format!(
                "broadcast reached {} of {} recipients; failures: {}",
                delivered,
                recipients.len(),
                failures.join("; ")
            )))
        }
    }

    /// Create a named channel over the given participants
    pub async fn create_channel(
        &self,
        name: impl Into<String>,
        participant_ids: Vec<String>,
    ) -> Result<Channel> {
        self.ensure_initialized()?;
        let channel = Channel::new(name, participant_ids);
        self.engine.create_channel(channel.clone())?;
        Ok(channel)
    }

    /// Revoke an agent's authorization and refuse it until unblocked
    pub async fn block_agent(&self, agent_id: &str) {
        self.security.block_agent(agent_id).await;
    }

    pub async fn unblock_agent(&self, agent_id: &str) {
        self.security.unblock_agent(agent_id).await;
    }

    /// Stop background loops, halt the monitor and deactivate all agents
    pub async fn shutdown(&self) -> Result<()> {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.monitor.stop().await;

        let agent_ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        for agent_id in agent_ids {
            if let Err(e) = self.engine.unregister_agent(&agent_id).await {
                warn!(agent_id = %agent_id, error = %e, "agent deactivation failed during shutdown");
            }
            if let Some(mut record) = self.agents.get_mut(&agent_id) {
                record.status = AgentStatus::Deactivated;
            }
        }

        self.queue.clear().await;
        self.initialized.store(false, Ordering::SeqCst);
        info!("framework shut down");
        Ok(())
    }

    /// Recompute the health snapshot immediately and return it. The heartbeat
    /// loop does the same on every tick.
    pub async fn refresh_health(&self) -> SystemHealth {
        let snapshot = compute_health(
            &self.agents,
            &self.queue,
            &self.monitor,
            self.config.max_queue_size,
            &self.error_count,
            &self.last_error,
            self.clock.now(),
        )
        .await;
        *self.health.write().await = snapshot.clone();
        snapshot
    }

    pub async fn system_health(&self) -> SystemHealth {
        self.health.read().await.clone()
    }

    pub async fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        self.monitor.current_metrics().await
    }

    pub async fn metrics_history(&self) -> Vec<PerformanceMetrics> {
        self.monitor.metrics_history().await
    }

    pub fn subscribe_metrics(&self) -> broadcast::Receiver<PerformanceMetrics> {
        self.monitor.subscribe()
    }

    /// Delivered messages, oldest first, bounded by `max_log_entries`
    pub async fn communication_log(&self) -> Vec<Message> {
        self.comm_log.read().await.iter().cloned().collect()
    }

    pub async fn security_events(&self) -> Vec<SecurityEvent> {
        self.security.events().await
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Look up a registered agent by id
    pub fn agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .get(agent_id)
            .map(|entry| Arc::clone(&entry.agent))
    }

    pub fn agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.agents.get(agent_id).map(|entry| entry.status)
    }

    pub fn active_agent_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|entry| entry.value().status == AgentStatus::Active)
            .count()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.engine.channels()
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn append_log(&self, message: Message) {
        let mut log = self.comm_log.write().await;
        if log.len() >= self.config.max_log_entries {
            log.pop_front();
        }
        log.push_back(message);
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CourierError::NotInitialized)
        }
    }
}

async fn compute_health(
    agents: &DashMap<String, AgentRecord>,
    queue: &MessageQueue,
    monitor: &PerformanceMonitor,
    max_queue_size: usize,
    error_count: &AtomicU64,
    last_error: &RwLock<Option<String>>,
    now: DateTime<Utc>,
) -> SystemHealth {
    let active_agents = agents
        .iter()
        .filter(|entry| entry.value().status == AgentStatus::Active)
        .count();
    let queue_size = queue.len().await;

    let (cpu_usage, memory_usage, average_message_latency, error_rate) =
        match monitor.current_metrics().await {
            Some(metrics) => (
                metrics.cpu_usage,
                metrics.memory_usage,
                metrics.average_message_latency,
                metrics.error_rate,
            ),
            None => (0.0, 0.0, 0.0, 0.0),
        };

    SystemHealth {
        is_healthy: active_agents >= 1 && queue_size < max_queue_size,
        active_agents,
        queue_size,
        cpu_usage,
        memory_usage,
        average_message_latency,
        error_rate,
        error_count: error_count.load(Ordering::Relaxed),
        last_error: last_error.read().await.clone(),
        last_updated: now,
    }
}
