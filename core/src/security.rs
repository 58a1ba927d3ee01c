// Security manager: agent authorization and message content policy
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::clock::Clock;
use crate::message::Message;
use crate::{CourierError, Result};

/// Substrings rejected by content inspection at Standard strictness and above
const CONTENT_BLOCKLIST: &[&str] = &["malicious", "attack", "exploit"];

/// Serialized payloads above this size are flagged at Enhanced strictness and above
const OVERSIZED_PAYLOAD_BYTES: usize = 16 * 1024;

const DEFAULT_EVENT_CAP: usize = 1000;

/// Strictness applied to agent and message validation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// No content checks
    Minimal,
    /// Reject payloads containing blocklisted substrings
    #[default]
    Standard,
    /// Standard plus flagging of oversized payloads
    Enhanced,
    /// Enhanced plus the signature verification hook
    Maximum,
}

/// Severity attached to an audit event, fixed per event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Classification of an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityEventKind {
    AgentValidated,
    AgentBlocked,
    AgentUnblocked,
    MessageValidated,
    UnauthorizedAccess,
    UnauthorizedMessage,
    SuspiciousActivity,
    SecurityBreach,
}

impl SecurityEventKind {
    pub fn severity(self) -> Severity {
        match self {
            SecurityEventKind::AgentValidated
            | SecurityEventKind::AgentUnblocked
            | SecurityEventKind::MessageValidated => Severity::Info,
            SecurityEventKind::AgentBlocked | SecurityEventKind::SuspiciousActivity => {
                Severity::Warning
            }
            SecurityEventKind::UnauthorizedAccess | SecurityEventKind::UnauthorizedMessage => {
                Severity::Error
            }
            SecurityEventKind::SecurityBreach => Severity::Critical,
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub severity: Severity,
}

/// Validates agents and messages against the configured security level.
///
/// Owns the authorized/blocked id sets and a bounded audit log. Every
/// rejection is returned to the caller as a `SecurityViolation` AND recorded
/// as an audit event; neither record substitutes for the other.
pub struct SecurityManager {
    level: SecurityLevel,
    authorized: DashSet<String>,
    blocked: DashSet<String>,
    events: RwLock<VecDeque<SecurityEvent>>,
    max_events: usize,
    clock: Arc<dyn Clock>,
}

impl SecurityManager {
    pub fn new(level: SecurityLevel, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(level, clock, DEFAULT_EVENT_CAP)
    }

    pub fn with_capacity(level: SecurityLevel, clock: Arc<dyn Clock>, max_events: usize) -> Self {
        Self {
            level,
            authorized: DashSet::new(),
            blocked: DashSet::new(),
            events: RwLock::new(VecDeque::new()),
            max_events,
            clock,
        }
    }

    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    /// Authorize an agent for traffic.
    ///
    /// Fails if the agent id is blocked. Authorization is monotonic:
    /// validating again after an unblock re-grants it.
    pub async fn validate_agent(&self, agent: &dyn Agent) -> Result<()> {
        let agent_id = agent.id();
        if self.blocked.contains(agent_id) {
            let detail = format!("agent {} is blocked", agent_id);
            self.record_event(SecurityEventKind::UnauthorizedAccess, detail.clone())
                .await;
            return Err(CourierError::SecurityViolation(detail));
        }

        self.authorized.insert(agent_id.to_string());
        self.record_event(
            SecurityEventKind::AgentValidated,
            format!("agent {} ({}) validated", agent_id, agent.agent_type()),
        )
        .await;
        Ok(())
    }

    /// Validate a message before it enters the queue.
    ///
    /// The sender must be authorized; the payload must pass the content
    /// policy of the configured level.
    pub async fn validate_message(&self, message: &Message) -> Result<()> {
        if !self.authorized.contains(message.sender_id()) {
            let detail = format!(
                "message {} from unauthorized sender {}",
                message.id(),
                message.sender_id()
            );
            self.record_event(SecurityEventKind::UnauthorizedMessage, detail.clone())
                .await;
            return Err(CourierError::SecurityViolation(detail));
        }

        self.inspect_content(message).await?;

        self.record_event(
            SecurityEventKind::MessageValidated,
            format!("message {} validated", message.id()),
        )
        .await;
        Ok(())
    }

    /// Revoke authorization and refuse future validation for this id
    pub async fn block_agent(&self, agent_id: &str) {
        self.blocked.insert(agent_id.to_string());
        self.authorized.remove(agent_id);
        self.record_event(
            SecurityEventKind::AgentBlocked,
            format!("agent {} blocked", agent_id),
        )
        .await;
    }

    /// Lift a block. Does not restore authorization; the agent must be
    /// validated again.
    pub async fn unblock_agent(&self, agent_id: &str) {
        self.blocked.remove(agent_id);
        self.record_event(
            SecurityEventKind::AgentUnblocked,
            format!("agent {} unblocked", agent_id),
        )
        .await;
    }

    pub fn is_authorized(&self, agent_id: &str) -> bool {
        self.authorized.contains(agent_id)
    }

    pub fn is_blocked(&self, agent_id: &str) -> bool {
        self.blocked.contains(agent_id)
    }

    /// Snapshot of the retained audit log, oldest first
    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.read().await.iter().cloned().collect()
    }

    async fn inspect_content(&self, message: &Message) -> Result<()> {
        if self.level == SecurityLevel::Minimal {
            return Ok(());
        }

        let serialized = serde_json::to_string(message.payload())?;
        let lowercase = serialized.to_lowercase();
        for needle in CONTENT_BLOCKLIST {
            if lowercase.contains(needle) {
                let detail = format!(
                    "message {} payload contains blocklisted content: {}",
                    message.id(),
                    needle
                );
                self.record_event(SecurityEventKind::SuspiciousActivity, detail.clone())
                    .await;
                return Err(CourierError::SecurityViolation(detail));
            }
        }

        if self.level >= SecurityLevel::Enhanced && serialized.len() > OVERSIZED_PAYLOAD_BYTES {
            // Flagged, not rejected
            self.record_event(
                SecurityEventKind::SuspiciousActivity,
                format!(
                    "message {} payload is oversized ({} bytes)",
                    message.id(),
                    serialized.len()
                ),
            )
            .await;
        }

        if self.level == SecurityLevel::Maximum {
            self.verify_signature(message)?;
        }

        Ok(())
    }

    /// Extension point for cryptographic signature checks at the Maximum
    /// level. Currently a no-op: the Maximum tier performs the Enhanced
    /// checks only, and callers must not rely on signature validation here.
    fn verify_signature(&self, _message: &Message) -> Result<()> {
        Ok(())
    }

    async fn record_event(&self, kind: SecurityEventKind, details: String) {
        let severity = kind.severity();
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            kind,
            timestamp: self.clock.now(),
            details,
            severity,
        };

        if severity >= Severity::Warning {
            warn!(kind = ?event.kind, details = %event.details, "security event");
        } else {
            debug!(kind = ?event.kind, details = %event.details, "security event");
        }

        let mut events = self.events.write().await;
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}
