// Agent capability consumed by the framework
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Message, Result};

/// Lifecycle state of an agent as tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Unregistered,
    Active,
    Deactivated,
}

/// Addressable unit that can receive and act on messages.
///
/// Implementations are supplied by the embedding application. The framework
/// requires a stable opaque identity, activation hooks, and a
/// mailbox-handling operation; everything else is the agent's business.
/// Handlers may suspend (they are allowed to do their own I/O) and may fail.
/// A handler failure is surfaced to the sender and to the coordination
/// engine's fault stream, never retried automatically.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable opaque identity used for addressing
    fn id(&self) -> &str;

    /// Type tag for diagnostics and registry queries
    fn agent_type(&self) -> &str;

    /// Called when the coordination engine activates this agent
    async fn on_activate(&self) -> Result<()> {
        Ok(())
    }

    /// Called when the coordination engine deactivates this agent
    async fn on_deactivate(&self) -> Result<()> {
        Ok(())
    }

    /// Accept a delivered message
    async fn handle_message(&self, message: Message) -> Result<()>;
}
