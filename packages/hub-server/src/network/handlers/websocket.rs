//! WebSocket lifecycle driver.
//!
//! One task pair per connection: the driver owns the receive side and the
//! routing loop, a spawned write loop drains the connection's outbound
//! queue into the socket. Registration happens before the first frame is
//! read; deregistration (and the telemetry slot drop) happens on every
//! exit path, identity-checked so a superseded connection cannot tear
//! down its replacement.
//!
//! Protocol per connection:
//! 1. connect to `/ws/{instance_id}`
//! 2. authenticate within the grace window or be closed with 4001
//! 3. exchange frames until disconnect

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tradehub_core::close_code;

use crate::registry::OutboundFrame;

use super::AppState;

/// `GET /ws/{instance_id}` -- upgrades and hands the socket to the driver.
pub async fn ws_handler(
    Path(instance_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| drive_connection(socket, state, instance_id))
}

/// Runs one connection from registration to teardown.
async fn drive_connection(socket: WebSocket, state: AppState, instance_id: String) {
    let _guard = state.shutdown.connection_guard();
    let (handle, outbound) = state
        .registry
        .register(&instance_id, state.config.connection.outbound_channel_capacity);

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound));

    // Bounded authentication handshake: the first frame must authenticate.
    let authenticated = match tokio::time::timeout(
        state.config.auth_timeout,
        recv_text(&mut stream, &instance_id),
    )
    .await
    {
        Err(_elapsed) => {
            warn!(instance_id = %instance_id, "auth timeout");
            handle.close(close_code::UNAUTHORIZED, "Auth timeout");
            false
        }
        Ok(None) => false,
        Ok(Some(text)) => {
            if let Some(reply) = state.router.route(&text, &instance_id) {
                let _ = handle.send_text(&reply);
            }
            if state.registry.is_authenticated(&instance_id) {
                true
            } else {
                warn!(instance_id = %instance_id, "auth failed, closing");
                handle.close(close_code::UNAUTHORIZED, "Unauthorized");
                false
            }
        }
    };

    if authenticated {
        while let Some(text) = recv_text(&mut stream, &instance_id).await {
            if let Some(reply) = state.router.route(&text, &instance_id) {
                if handle.send_text(&reply).is_err() {
                    break;
                }
            }
        }
    }

    if state.registry.deregister(&instance_id, &handle) {
        state.telemetry.remove(&instance_id);
    }
    // Dropping our handle sender (the registry's copy is already gone for
    // the un-superseded case) ends the write loop, which closes the socket.
    drop(handle);
    let _ = writer.await;
}

/// Reads until a text frame arrives. Control frames are handled by axum;
/// close, stream end, and transport errors all finish the session.
async fn recv_text(stream: &mut SplitStream<WebSocket>, instance_id: &str) -> Option<String> {
    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) => {
                info!(instance_id, "peer closed");
                return None;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(instance_id, %err, "transport error");
                return None;
            }
        }
    }
    None
}

/// Drains the outbound queue into the socket, serializing all writes to
/// this peer. Exits on a close frame, a write failure, or queue teardown.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            OutboundFrame::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        }
    }
}
