// Coordination engine tests: registration lifecycle, routing, channels, faults

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::{
    Agent, Channel, CoordinationEngine, CourierError, Message, MessagePriority, MessageType,
    Result, SystemClock,
};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

// =============================================================================
// Mock agents
// =============================================================================

/// Records activation state and every message id it handles
struct CountingAgent {
    id: String,
    activated: AtomicBool,
    deactivated: AtomicBool,
    handled: Mutex<Vec<Uuid>>,
}

impl CountingAgent {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            activated: AtomicBool::new(false),
            deactivated: AtomicBool::new(false),
            handled: Mutex::new(Vec::new()),
        })
    }

    fn handled_ids(&self) -> Vec<Uuid> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for CountingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> &str {
        "counting"
    }

    async fn on_activate(&self) -> Result<()> {
        self.activated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn on_deactivate(&self) -> Result<()> {
        self.deactivated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        self.handled.lock().unwrap().push(message.id());
        Ok(())
    }
}

/// Always fails to handle
struct FailingAgent {
    id: String,
}

#[async_trait]
impl Agent for FailingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> &str {
        "failing"
    }

    async fn handle_message(&self, _message: Message) -> Result<()> {
        Err(CourierError::CommunicationFailure(
            "simulated handler failure".to_string(),
        ))
    }
}

fn engine() -> (
    CoordinationEngine,
    tokio::sync::mpsc::UnboundedReceiver<courier_core::RoutingFault>,
) {
    CoordinationEngine::new(Arc::new(SystemClock))
}

fn task_for(receiver: &str) -> Message {
    Message::new(
        "sender",
        receiver,
        MessageType::Task,
        HashMap::new(),
        MessagePriority::Normal,
    )
}

// =============================================================================
// Initialization guard
// =============================================================================

#[tokio::test]
async fn operations_fail_fast_before_initialize() {
    let (engine, _faults) = engine();
    let agent = CountingAgent::new("agent-a");

    let err = engine.register_agent(agent.clone()).await.unwrap_err();
    assert!(matches!(err, CourierError::NotInitialized));

    let err = engine.route_message(task_for("agent-a")).await.unwrap_err();
    assert!(matches!(err, CourierError::NotInitialized));

    let err = engine
        .create_channel(Channel::new("ops", vec![]))
        .unwrap_err();
    assert!(matches!(err, CourierError::NotInitialized));
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let (engine, _faults) = engine();
    engine.initialize();
    engine.initialize();

    let agent = CountingAgent::new("agent-a");
    engine.register_agent(agent.clone()).await.unwrap();
    assert!(engine.is_registered("agent-a"));
}

// =============================================================================
// Registration lifecycle and routing
// =============================================================================

#[tokio::test]
async fn register_activates_and_routes_exactly_once() {
    let (engine, _faults) = engine();
    engine.initialize();

    let agent = CountingAgent::new("agent-a");
    engine.register_agent(agent.clone()).await.unwrap();
    assert!(agent.activated.load(Ordering::SeqCst));
    assert_eq!(engine.agent_count(), 1);

    let message = task_for("agent-a");
    let message_id = message.id();
    engine.route_message(message).await.unwrap();

    assert_eq!(agent.handled_ids(), vec![message_id]);
}

#[tokio::test]
async fn routing_to_unknown_agent_never_invokes_handlers() {
    let (engine, _faults) = engine();
    engine.initialize();

    let bystander = CountingAgent::new("bystander");
    engine.register_agent(bystander.clone()).await.unwrap();

    let err = engine.route_message(task_for("ghost")).await.unwrap_err();
    assert!(matches!(err, CourierError::AgentNotFound(id) if id == "ghost"));
    assert!(bystander.handled_ids().is_empty());
}

#[tokio::test]
async fn unregister_deactivates_and_removes_route() {
    let (engine, _faults) = engine();
    engine.initialize();

    let agent = CountingAgent::new("agent-a");
    engine.register_agent(agent.clone()).await.unwrap();

    engine.unregister_agent("agent-a").await.unwrap();
    assert!(agent.deactivated.load(Ordering::SeqCst));
    assert!(!engine.is_registered("agent-a"));

    let err = engine.route_message(task_for("agent-a")).await.unwrap_err();
    assert!(matches!(err, CourierError::AgentNotFound(_)));
}

#[tokio::test]
async fn unregistering_unknown_agent_fails() {
    let (engine, _faults) = engine();
    engine.initialize();

    let err = engine.unregister_agent("ghost").await.unwrap_err();
    assert!(matches!(err, CourierError::AgentNotFound(_)));
}

// =============================================================================
// Fault stream
// =============================================================================

#[tokio::test]
async fn handler_failure_is_raised_and_mirrored_on_fault_stream() {
    let (engine, mut faults) = engine();
    engine.initialize();

    engine
        .register_agent(Arc::new(FailingAgent {
            id: "flaky".to_string(),
        }))
        .await
        .unwrap();

    let message = task_for("flaky");
    let message_id = message.id();
    let err = engine.route_message(message).await.unwrap_err();
    assert!(matches!(err, CourierError::CommunicationFailure(_)));

    let fault = timeout(Duration::from_secs(1), faults.recv())
        .await
        .expect("fault expected on stream")
        .unwrap();
    assert_eq!(fault.message_id, message_id);
    assert_eq!(fault.receiver_id, "flaky");
    assert!(fault.detail.contains("simulated handler failure"));
}

// =============================================================================
// Channels
// =============================================================================

#[tokio::test]
async fn channel_with_unknown_participant_is_not_stored() {
    let (engine, _faults) = engine();
    engine.initialize();

    let agent = CountingAgent::new("agent-a");
    engine.register_agent(agent.clone()).await.unwrap();

    let channel = Channel::new("ops", vec!["agent-a".to_string(), "ghost".to_string()]);
    let err = engine.create_channel(channel).unwrap_err();
    assert!(matches!(err, CourierError::AgentNotFound(id) if id == "ghost"));
    assert!(engine.channels().is_empty());
}

#[tokio::test]
async fn channel_creation_and_activity_tracking() {
    let (engine, _faults) = engine();
    engine.initialize();

    let a = CountingAgent::new("agent-a");
    let b = CountingAgent::new("agent-b");
    engine.register_agent(a.clone()).await.unwrap();
    engine.register_agent(b.clone()).await.unwrap();

    let channel = Channel::new("ops", vec!["agent-a".to_string(), "agent-b".to_string()]);
    let channel_id = channel.id();
    engine.create_channel(channel).unwrap();

    let stored = engine.channel(&channel_id).unwrap();
    assert_eq!(stored.name(), "ops");
    assert_eq!(stored.participants().len(), 2);
    assert_eq!(stored.message_count(), 0);

    engine.record_channel_activity(&channel_id).unwrap();
    engine.record_channel_activity(&channel_id).unwrap();
    let stored = engine.channel(&channel_id).unwrap();
    assert_eq!(stored.message_count(), 2);
    assert!(stored.last_activity() >= stored.created_at());
}
