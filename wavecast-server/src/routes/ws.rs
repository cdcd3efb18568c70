//! `GET /audio/{session_id}/stream` — the bidirectional audio channel.
//! Binary frames are raw PCM; text frames are control JSON. Splits the
//! socket and runs one ingest task and one egress task, `tokio::select!`
//! on whichever exits first.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use wavecast_core::dispatcher::{self, SessionMsg};
use wavecast_core::session::{AudioMetadata, TranscriptionConfig};
use wavecast_core::{ControlMessage, OutboundMessage};

use crate::state::AppState;

pub async fn stream_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, session_id, state))
}

async fn handle_stream(socket: WebSocket, session_id: String, state: AppState) {
    state.active_connections.fetch_add(1, Ordering::Relaxed);
    info!(session_id, "stream connected");

    let session = state.sessions.get_or_create(
        &session_id,
        AudioMetadata::default(),
        TranscriptionConfig::default(),
    );

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let dispatcher_handle = dispatcher::spawn(session, outbound_tx.clone());

    if let Some(previous) = state
        .dispatchers
        .lock()
        .insert(session_id.clone(), dispatcher_handle)
    {
        // A dispatcher was already running for this id (stale reconnect) —
        // shut it down so only one ever writes to the session.
        tokio::spawn(previous.shutdown(std::time::Duration::from_secs(2)));
    }

    let _ = outbound_tx.send(OutboundMessage::connection_status(session_id.clone()));

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut egress = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if ws_sender.send(Message::Text(message.to_json().into())).await.is_err() {
                break;
            }
        }
    });

    let dispatcher_tx = state
        .dispatchers
        .lock()
        .get(&session_id)
        .map(|h| h.tx.clone());

    let mut ingest = tokio::spawn(async move {
        let Some(dispatcher_tx) = dispatcher_tx else {
            return;
        };
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Binary(bytes)) => {
                    if dispatcher_tx.send(SessionMsg::Audio(bytes.into())).is_err() {
                        break;
                    }
                }
                Ok(Message::Text(text)) => {
                    if let Some(control) = ControlMessage::parse(&text) {
                        if dispatcher_tx.send(SessionMsg::Control(control)).is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut ingest => { egress.abort(); }
        _ = &mut egress => { ingest.abort(); }
    }

    state.dispatchers.lock().remove(&session_id);
    state.active_connections.fetch_sub(1, Ordering::Relaxed);
    info!(session_id, "stream disconnected");
}
