//! Per-agent FIFO mailboxes.
//!
//! The orchestrator owns one queue per admitted agent.  Senders append,
//! the owning agent drains atomically, and the system-event scanner may
//! re-insert unconsumed messages at the head while preserving their
//! original order.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// An immutable inter-agent message.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub from: String,
    pub to: String,
    /// Arbitrary keyed record; senders and receivers agree on the shape.
    pub content: Value,
    pub ts: DateTime<Utc>,
}

/// The set of mailboxes, keyed by agent id.
pub struct Mailboxes {
    queues: Mutex<HashMap<String, VecDeque<AgentMessage>>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty queue for a newly admitted agent.
    ///
    /// Called during admission, strictly before the agent's first
    /// scheduling tick, so no message sent to the agent can be lost.
    pub async fn create(&self, agent_id: &str) {
        let mut queues = self.queues.lock().await;
        queues.entry(agent_id.to_string()).or_default();
    }

    /// Append a message to the recipient's queue (FIFO).
    ///
    /// Returns `false` when the recipient has no mailbox.
    pub async fn send(&self, from: &str, to: &str, content: Value) -> bool {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(to) {
            Some(queue) => {
                queue.push_back(AgentMessage {
                    from: from.to_string(),
                    to: to.to_string(),
                    content,
                    ts: Utc::now(),
                });
                true
            }
            None => {
                log::warn!(
                    target: "aos::mailbox",
                    "Dropping message from {} to unknown agent {}",
                    from,
                    to
                );
                false
            }
        }
    }

    /// Atomically drain every message queued for `agent_id`.
    pub async fn drain(&self, agent_id: &str) -> Vec<AgentMessage> {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(agent_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Put messages back at the head of a queue, preserving their order.
    ///
    /// Used by the system-event scanner: it drains a queue, consumes the
    /// system messages, and restores the rest exactly as they were.
    pub async fn reinsert_front(&self, agent_id: &str, messages: Vec<AgentMessage>) {
        if messages.is_empty() {
            return;
        }
        let mut queues = self.queues.lock().await;
        if let Some(queue) = queues.get_mut(agent_id) {
            for message in messages.into_iter().rev() {
                queue.push_front(message);
            }
        }
    }

    /// Ids of every agent that currently has a mailbox.
    pub async fn owners(&self) -> Vec<String> {
        let queues = self.queues.lock().await;
        queues.keys().cloned().collect()
    }
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_and_drain_preserve_fifo_order() {
        let mailboxes = Mailboxes::new();
        mailboxes.create("b").await;
        assert!(mailboxes.send("a", "b", json!({"n": 1})).await);
        assert!(mailboxes.send("a", "b", json!({"n": 2})).await);
        assert!(mailboxes.send("c", "b", json!({"n": 3})).await);

        let drained = mailboxes.drain("b").await;
        let order: Vec<i64> = drained
            .iter()
            .map(|m| m.content["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(mailboxes.drain("b").await.is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_recipient_is_dropped() {
        let mailboxes = Mailboxes::new();
        assert!(!mailboxes.send("a", "ghost", json!({})).await);
    }

    #[tokio::test]
    async fn reinsert_front_restores_original_order() {
        let mailboxes = Mailboxes::new();
        mailboxes.create("b").await;
        mailboxes.send("a", "b", json!({"n": 1})).await;
        mailboxes.send("a", "b", json!({"n": 2})).await;

        let drained = mailboxes.drain("b").await;
        mailboxes.reinsert_front("b", drained).await;
        // A message that arrives after the re-insertion queues behind.
        mailboxes.send("a", "b", json!({"n": 3})).await;

        let order: Vec<i64> = mailboxes
            .drain("b")
            .await
            .iter()
            .map(|m| m.content["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
