//! WebSocket handling
//!
//! Each connection owns one session actor. Inbound binary frames are raw
//! PCM audio; inbound JSON carries control messages. Outbound traffic is a
//! single writer task draining one channel, so JSON events and binary audio
//! quanta can never interleave incorrectly.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voice_loop_pipeline::{spawn_session, SessionInput};

use crate::protocol::{frame_for, ClientMessage, OutboundFrame, ServerMessage};
use crate::state::AppState;

/// Handle a WebSocket upgrade request.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(session_id) = state.registry.try_register() else {
        tracing::warn!("connection refused: session cap reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, &state, &session_id).await;
        state.registry.remove(&session_id);
    })
}

async fn handle_socket(socket: WebSocket, state: &AppState, session_id: &str) {
    let scorer = match state.build_scorer() {
        Ok(scorer) => scorer,
        Err(e) => {
            // Startup preflight makes this unreachable in practice; if it
            // happens anyway the connection is unusable.
            tracing::error!(error = %e, "failed to build speech scorer");
            return;
        }
    };

    let session = spawn_session(
        state.providers.clone(),
        state.settings.pipeline.clone(),
        scorer,
    );
    let session_input = session.input;
    let mut session_events = session.events;

    let (mut sink, mut stream) = socket.split();

    // Single outbound channel: session events, pongs, everything.
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(256);

    // Forward session events into the outbound channel.
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = session_events.recv().await {
            if forward_tx.send(frame_for(event)).await.is_err() {
                break;
            }
        }
    });

    // Writer task: the only place that touches the sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                OutboundFrame::Message(message) => match serde_json::to_string(&message) {
                    Ok(json) => Message::Text(json),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                },
                OutboundFrame::Audio(bytes) => Message::Binary(bytes),
                OutboundFrame::Pong(payload) => Message::Pong(payload),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Reader loop.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(audio)) => {
                if session_input
                    .send(SessionInput::Audio(audio))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping { timestamp }) => {
                    let _ = out_tx
                        .send(OutboundFrame::Message(ServerMessage::Pong { timestamp }))
                        .await;
                }
                Err(_) => {
                    tracing::debug!(message = %text, "ignoring unknown client message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = out_tx.send(OutboundFrame::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "websocket receive error");
                break;
            }
        }
    }

    // Dropping the input channel lets the session actor wind down once any
    // in-flight stage task finishes; the outbound side has nowhere to write
    // anymore.
    drop(session_input);
    drop(out_tx);
    forwarder.abort();
    writer.abort();

    tracing::info!(session_id = %session_id, "websocket closed");
}
