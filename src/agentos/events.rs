//! Visualizer event stream.
//!
//! The orchestrator publishes graph mutations on a broadcast bus; each
//! connected WebSocket client holds its own receiver.  Frames follow the
//! wire protocol consumed by the browser visualizer:
//!
//! ```json
//! {"type": "agent_created", "payload": {"node": {...}, "edge": {...}}}
//! {"type": "agent_state_changed", "payload": {"id": "...", "state": "..."}}
//! ```

use serde::Serialize;
use tokio::sync::broadcast;

/// A node in the agent hierarchy graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    /// Short label rendered inside the node (the agent's role).
    pub label: String,
    /// Hover title (role plus id).
    pub title: String,
    pub state: String,
}

/// A parent → child edge.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Events pushed to visualizer clients, serialized as
/// `{"type": ..., "payload": ...}` JSON text frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum VisualizerEvent {
    /// Complete graph, sent once per client on connect.
    FullSync {
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    },
    /// A new agent was admitted.  `edge` is absent for the founder.
    AgentCreated {
        node: GraphNode,
        edge: Option<GraphEdge>,
    },
    /// An agent transitioned to a new lifecycle state.
    AgentStateChanged { id: String, state: String },
}

/// Cloneable handle on the broadcast bus.
///
/// Emission never blocks: when no client is connected the event is simply
/// discarded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VisualizerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn emit(&self, event: VisualizerEvent) {
        // send() only errors when there are no receivers; that is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisualizerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_to_the_wire_shape() {
        let event = VisualizerEvent::AgentStateChanged {
            id: "ab12cd34".to_string(),
            state: "completed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent_state_changed");
        assert_eq!(json["payload"]["id"], "ab12cd34");
        assert_eq!(json["payload"]["state"], "completed");
    }

    #[test]
    fn agent_created_omits_edge_for_the_founder() {
        let event = VisualizerEvent::AgentCreated {
            node: GraphNode {
                id: "f".to_string(),
                label: "Founder".to_string(),
                title: "Founder (f)".to_string(),
                state: "active".to_string(),
            },
            edge: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent_created");
        assert!(json["payload"]["edge"].is_null());
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(VisualizerEvent::AgentStateChanged {
            id: "x".to_string(),
            state: "failed".to_string(),
        });
        let event = rx.recv().await.unwrap();
        match event {
            VisualizerEvent::AgentStateChanged { id, .. } => assert_eq!(id, "x"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
