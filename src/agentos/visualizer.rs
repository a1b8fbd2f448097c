//! Live visualizer endpoint.
//!
//! Serves the WebSocket stream consumed by the browser-side hierarchy
//! view: each client receives a `full_sync` frame on connect, then a
//! relay of `agent_created` / `agent_state_changed` events as they
//! happen.  Every client owns its own broadcast receiver; a slow client
//! that lags simply skips the missed frames.

use crate::agentos::events::VisualizerEvent;
use crate::agentos::orchestrator::Orchestrator;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Serve the visualizer WebSocket endpoint until the process exits.
pub async fn serve(
    orchestrator: Arc<Orchestrator>,
    addr: SocketAddr,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = Router::new()
        .route("/ws", get(handler_ws))
        .with_state(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!(target: "aos::visualizer", "Visualizer listening on ws://{}/ws", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handler_ws(
    ws: WebSocketUpgrade,
    State(orchestrator): State<Arc<Orchestrator>>,
) -> impl IntoResponse {
    // Each client gets its own broadcast receiver.
    let events = orchestrator.events().subscribe();
    ws.on_upgrade(move |socket| client_loop(socket, orchestrator, events))
}

async fn client_loop(
    mut socket: WebSocket,
    orchestrator: Arc<Orchestrator>,
    mut events: broadcast::Receiver<VisualizerEvent>,
) {
    // Full sync first, so the client can draw the current graph.
    let (nodes, edges) = orchestrator.graph_snapshot().await;
    if send_event(&mut socket, &VisualizerEvent::FullSync { nodes, edges })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!(
                            target: "aos::visualizer",
                            "Visualizer client lagged, skipped {} events",
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &VisualizerEvent) -> Result<(), ()> {
    let frame = serde_json::to_string(event).map_err(|_| ())?;
    socket
        .send(Message::Text(frame.into()))
        .await
        .map_err(|_| ())
}
