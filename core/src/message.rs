// Message value types exchanged between agents
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scalar payload value.
///
/// A closed tagged union so payload handling is exhaustively matchable and
/// serialization is total. Untagged on the wire: payloads read as plain JSON
/// scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PayloadValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PayloadValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PayloadValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PayloadValue::Float(f) => Some(*f),
            PayloadValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PayloadValue {
    fn from(v: bool) -> Self {
        PayloadValue::Bool(v)
    }
}

impl From<i64> for PayloadValue {
    fn from(v: i64) -> Self {
        PayloadValue::Int(v)
    }
}

impl From<f64> for PayloadValue {
    fn from(v: f64) -> Self {
        PayloadValue::Float(v)
    }
}

impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        PayloadValue::Str(v.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(v: String) -> Self {
        PayloadValue::Str(v)
    }
}

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Heartbeat,
    HeartbeatResponse,
    Status,
    StatusResponse,
    Task,
    TaskResponse,
    Data,
    Command,
    Notification,
    Error,
    Shutdown,
    Broadcast,
    Custom,
}

/// Delivery priority tier. Higher tiers drain from the queue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

/// Immutable message value routed between agents.
///
/// Sender, receiver, type, payload, timestamp and priority are fixed at
/// construction; only the retry counter mutates afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    sender_id: String,
    receiver_id: String,
    message_type: MessageType,
    payload: HashMap<String, PayloadValue>,
    timestamp: DateTime<Utc>,
    priority: MessagePriority,
    attempts: u32,
}

impl Message {
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        message_type: MessageType,
        payload: HashMap<String, PayloadValue>,
        priority: MessagePriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            message_type,
            payload,
            timestamp: Utc::now(),
            priority,
            attempts: 0,
        }
    }

    /// Fan-out copy: fresh id and timestamp, same sender/type/payload/priority,
    /// addressed to `receiver_id`.
    pub fn readdressed(&self, receiver_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: self.sender_id.clone(),
            receiver_id: receiver_id.into(),
            message_type: self.message_type,
            payload: self.payload.clone(),
            timestamp,
            priority: self.priority,
            attempts: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &HashMap<String, PayloadValue> {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn priority(&self) -> MessagePriority {
        self.priority
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Bump the retry counter. The only mutation a message permits.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }
}
