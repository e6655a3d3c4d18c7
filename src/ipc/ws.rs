//! Live status stream over WebSocket.
//!
//! Every committed Supervisor transition is pushed as
//! `{"type":"status","data":[snapshot...]}`. A `{"type":"get_status"}`
//! message from the client answers with an immediate snapshot, and new
//! connections receive one without asking. Reconnecting clients leave no
//! state behind; the subscription dies with the socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;

use super::ApiServer;
use crate::supervisor::record::ProcessSnapshot;

/// GET /ws
pub async fn status_stream(ws: WebSocketUpgrade, State(state): State<ApiServer>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiServer) {
    let (mut sender, mut receiver) = socket.split();
    let mut status_rx = state.supervisor.broadcaster().subscribe();
    tracing::debug!(
        "status subscriber connected ({} total)",
        state.supervisor.broadcaster().subscriber_count()
    );

    // connect-time snapshot, so viewers need not wait for the next change
    let initial = status_message(&status_rx.borrow_and_update());
    if sender.send(Message::Text(initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let payload = status_message(&status_rx.borrow_and_update());
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let wants_status = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|v| v.get("type").and_then(|t| t.as_str().map(String::from)))
                            .is_some_and(|t| t == "get_status");
                        if wants_status {
                            let payload = status_message(&state.supervisor.broadcaster().latest());
                            if sender.send(Message::Text(payload)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("status subscriber disconnected");
}

fn status_message(snapshots: &[ProcessSnapshot]) -> String {
    json!({ "type": "status", "data": snapshots }).to_string()
}
