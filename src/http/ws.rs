//! Realtime WebSocket endpoint
//!
//! One socket per client. Inbound frames are dispatched to the engine;
//! outbound frames drain from the hub's per-connection channel through a
//! writer task, so engine sends never block on a slow client.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

use crate::messages::{ClientMessage, ClientRole};
use crate::state::AppState;

/// Handle WebSocket upgrade requests
pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<String>();
    let conn_id = state.hub.add(tx);
    tracing::debug!(
        %conn_id,
        connections = state.hub.connection_count(),
        "client connected"
    );

    state
        .hub
        .send_to(conn_id, &state.engine.init_message(conn_id));

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&state, conn_id, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%conn_id, %err, "websocket error");
                break;
            }
        }
    }

    // Transport closed: drop the connection and its roster membership.
    state.hub.remove(conn_id);
    state.engine.leave_subtitler(conn_id);
    writer.abort();
    tracing::debug!(%conn_id, "client disconnected");
}

fn handle_frame(state: &Arc<AppState>, conn_id: Uuid, raw: &str) {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(%conn_id, %err, "unparseable frame");
            return;
        }
    };
    match message {
        ClientMessage::Identify { client_type, name } => {
            tracing::debug!(%conn_id, ?client_type, "client identified");
            state.hub.identify(conn_id, client_type, name);
        }
        ClientMessage::FragmentJoin { name } => {
            if state.hub.role_of(conn_id) == Some(ClientRole::Subtitler) {
                state.engine.join_subtitler(conn_id, name);
            }
        }
        ClientMessage::FragmentLeave {} => {
            state.engine.leave_subtitler(conn_id);
        }
        ClientMessage::Caption {
            text,
            subtitler_name,
            auto_sent,
        } => {
            // Rejections are expected near slot boundaries; log, don't
            // surface.
            if let Err(err) = state
                .engine
                .submit_caption(conn_id, &text, subtitler_name, auto_sent)
            {
                tracing::debug!(%conn_id, %err, "caption rejected");
            }
        }
    }
}
