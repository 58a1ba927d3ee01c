// Courier Core Library
// In-process multi-agent communication framework runtime

pub mod agent;
pub mod clock;
pub mod config;
pub mod coordination;
pub mod message;
pub mod monitor;
pub mod orchestrator;
pub mod queue;
pub mod security;

// Export core types
pub use agent::{Agent, AgentStatus};
pub use clock::{Clock, SystemClock};
pub use config::FrameworkConfig;
pub use coordination::{Channel, CoordinationEngine, RoutingFault};
pub use message::{Message, MessagePriority, MessageType, PayloadValue};
pub use monitor::{PerformanceMetrics, PerformanceMonitor};
pub use orchestrator::{Orchestrator, SystemHealth};
pub use queue::MessageQueue;
pub use security::{SecurityEvent, SecurityEventKind, SecurityLevel, SecurityManager, Severity};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("framework not initialized")]
    NotInitialized,

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("communication failure: {0}")]
    CommunicationFailure(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CourierError>;
