// Priority message queue
use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::message::Message;

/// Thread-safe ordered buffer of messages.
///
/// Higher priority drains first; messages of equal priority keep their
/// insertion order. All operations take the internal lock for the duration of
/// the buffer manipulation only, so critical sections stay short; any
/// long-running work belongs to the caller, after release.
///
/// The queue enforces no capacity of its own. Overflow protection is a policy
/// decision made by the orchestrator's health check.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert preserving priority order: the message lands immediately before
    /// the first entry with strictly lower priority, else at the back.
    pub async fn enqueue(&self, message: Message) {
        let mut queue = self.inner.lock().await;
        let position = queue
            .iter()
            .position(|queued| queued.priority() < message.priority())
            .unwrap_or(queue.len());
        queue.insert(position, message);
    }

    /// Remove and return the highest-priority, oldest-enqueued message.
    pub async fn dequeue(&self) -> Option<Message> {
        self.inner.lock().await.pop_front()
    }

    /// Return the message `dequeue` would yield, without removing it.
    pub async fn peek(&self) -> Option<Message> {
        self.inner.lock().await.front().cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}
