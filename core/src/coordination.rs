// Coordination engine: routing table, channel registry, message delivery
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::clock::Clock;
use crate::message::Message;
use crate::{CourierError, Result};

/// Named multi-party grouping of agents.
///
/// Participants are validated against the routing table once, at creation.
/// Membership is not re-validated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    id: Uuid,
    name: String,
    participants: HashSet<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    message_count: u64,
}

impl Channel {
    pub fn new(name: impl Into<String>, participants: impl IntoIterator<Item = String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            participants: participants.into_iter().collect(),
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participants(&self) -> &HashSet<String> {
        &self.participants
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn record_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity = at;
        self.message_count += 1;
    }
}

/// Failure observed on the routing/handling path, mirrored onto the fault
/// stream for the orchestrator. The caller still receives the error directly;
/// this record is observability, not control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingFault {
    pub message_id: Uuid,
    pub receiver_id: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Owns the routing table and channel registry; delivers validated messages
/// to their recipient agents.
///
/// Agent lifecycle per id: unregistered until `register_agent` (which
/// activates the agent and adds it to the table), active until
/// `unregister_agent` (which deactivates, then removes). Every operation
/// fails fast with `NotInitialized` before `initialize` has been called.
pub struct CoordinationEngine {
    initialized: AtomicBool,
    routes: DashMap<String, Arc<dyn Agent>>,
    channels: DashMap<Uuid, Channel>,
    fault_tx: mpsc::UnboundedSender<RoutingFault>,
    clock: Arc<dyn Clock>,
}

impl CoordinationEngine {
    /// Returns the engine together with the receiving end of its fault stream.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<RoutingFault>) {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        (
            Self {
                initialized: AtomicBool::new(false),
                routes: DashMap::new(),
                channels: DashMap::new(),
                fault_tx,
                clock,
            },
            fault_rx,
        )
    }

    /// Idempotent; must run once before any routing or registration call
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("coordination engine already initialized");
            return;
        }
        info!("coordination engine initialized");
    }

    /// Activate an agent and add it to the routing table
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        self.ensure_initialized()?;
        agent.on_activate().await?;
        let agent_id = agent.id().to_string();
        self.routes.insert(agent_id.clone(), agent);
        info!(agent_id = %agent_id, "agent registered for routing");
        Ok(())
    }

    /// Deactivate an agent, then remove it from the routing table
    ///
    /// # Errors
    ///
    /// `AgentNotFound` if the id has no routing entry.
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        self.ensure_initialized()?;
        let agent = self
            .routes
            .get(agent_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CourierError::AgentNotFound(agent_id.to_string()))?;
        agent.on_deactivate().await?;
        self.routes.remove(agent_id);
        info!(agent_id = %agent_id, "agent unregistered from routing");
        Ok(())
    }

    /// Hand a message to its recipient's mailbox-handling capability.
    ///
    /// # Errors
    ///
    /// `AgentNotFound` if the receiver has no routing entry; the handler is
    /// never invoked in that case. `CommunicationFailure` if the handler
    /// itself fails; the failure is additionally pushed onto the fault
    /// stream. No automatic retry either way.
    pub async fn route_message(&self, message: Message) -> Result<()> {
        self.ensure_initialized()?;
        let message_id = message.id();
        let receiver_id = message.receiver_id().to_string();

        let agent = self
            .routes
            .get(&receiver_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CourierError::AgentNotFound(receiver_id.clone()))?;

        debug!(message_id = %message_id, receiver_id = %receiver_id, "routing message");

        if let Err(e) = agent.handle_message(message).await {
            let detail = format!(
                "agent {} failed to handle message {}: {}",
                receiver_id, message_id, e
            );
            let fault = RoutingFault {
                message_id,
                receiver_id,
                detail: detail.clone(),
                timestamp: self.clock.now(),
            };
            if self.fault_tx.send(fault).is_err() {
                warn!("fault stream closed, dropping routing fault");
            }
            return Err(CourierError::CommunicationFailure(detail));
        }
        Ok(())
    }

    /// Store a channel after checking that every participant is currently
    /// registered. Nothing is stored on failure.
    ///
    /// # Errors
    ///
    /// `AgentNotFound` naming the first unknown participant.
    pub fn create_channel(&self, channel: Channel) -> Result<()> {
        self.ensure_initialized()?;
        for participant in channel.participants() {
            if !self.routes.contains_key(participant) {
                return Err(CourierError::AgentNotFound(participant.clone()));
            }
        }
        info!(
            channel_id = %channel.id(),
            name = %channel.name(),
            participants = channel.participants().len(),
            "channel created"
        );
        self.channels.insert(channel.id(), channel);
        Ok(())
    }

    /// Bump a channel's activity counters
    pub fn record_channel_activity(&self, channel_id: &Uuid) -> Result<()> {
        self.ensure_initialized()?;
        let now = self.clock.now();
        let mut entry = self.channels.get_mut(channel_id).ok_or_else(|| {
            CourierError::CommunicationFailure(format!("unknown channel {}", channel_id))
        })?;
        entry.record_activity(now);
        Ok(())
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.routes.contains_key(agent_id)
    }

    pub fn agent_count(&self) -> usize {
        self.routes.len()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.routes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn channel(&self, channel_id: &Uuid) -> Option<Channel> {
        self.channels.get(channel_id).map(|entry| entry.clone())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|entry| entry.clone()).collect()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CourierError::NotInitialized)
        }
    }
}
