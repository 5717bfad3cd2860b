//! WebSocket event subscriptions.
//!
//! The client opens the socket, sends one text frame selecting an entity
//! (or `"*"`) and an optional resume cursor, and then receives one text
//! frame per matching event in ascending sequence order. A subscriber that
//! stops draining its queue is evicted and closed with a "try again" code;
//! it reconnects with `from_seq` set to its last received `seq` and misses
//! nothing.

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tessera_broadcast::{CloseReason, EntityFilter};

use crate::state::AppState;

/// First frame sent by the client.
#[derive(Debug, Deserialize)]
struct SubscribeFrame {
    /// Entity name, or `"*"` for all entities.
    entity: String,
    /// Last sequence number already seen; events after it are replayed.
    #[serde(default)]
    from_seq: u64,
}

/// GET /subscribe
async fn subscribe(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // The first text frame selects the filter and cursor.
    let request = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<SubscribeFrame>(&text) {
                Ok(frame) => break frame,
                Err(err) => {
                    tracing::debug!(%err, "malformed subscribe frame");
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "malformed subscribe frame".into(),
                        })))
                        .await;
                    return;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_) | Message::Binary(_))) | Some(Err(_)) | None => return,
        }
    };

    let filter = EntityFilter::from_pattern(&request.entity);
    let mut stream = state.engine.subscribe(filter, request.from_seq);
    tracing::debug!(subscription = %stream.id(), from_seq = request.from_seq, "subscriber attached");

    let (mut tx, mut rx) = socket.split();
    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        break;
                    };
                    if tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    if stream.close_reason() == Some(CloseReason::Overflow) {
                        tracing::warn!(subscription = %stream.id(), "slow subscriber evicted");
                        let _ = tx
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::AGAIN,
                                reason: "event queue overflow; reconnect with from_seq".into(),
                            })))
                            .await;
                    }
                    break;
                }
            },
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Returns the subscription router.
pub fn router() -> Router<AppState> {
    Router::new().route("/subscribe", get(subscribe))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_defaults_the_cursor_to_zero() {
        let frame: SubscribeFrame = serde_json::from_str(r#"{"entity": "*"}"#).unwrap();
        assert_eq!(frame.entity, "*");
        assert_eq!(frame.from_seq, 0);

        let frame: SubscribeFrame =
            serde_json::from_str(r#"{"entity": "users", "from_seq": 42}"#).unwrap();
        assert_eq!(frame.from_seq, 42);
    }
}
