//! WebSocket streaming endpoint.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::{debug, info, instrument, warn};

use super::transfers::transfers_response;
use crate::api::models::{BlockResponse, StreamMessage};
use crate::app_state::AppState;

/// Transfers included in each `transfers` message.
const STREAM_TRANSFER_LIMIT: usize = 100;

#[utoipa::path(
    get,
    path = "/api/v1/stream",
    responses(
        (status = 101, description = "WebSocket upgrade")
    ),
    tag = "Streaming"
)]
/// WebSocket endpoint pushing new heads and transfer set changes.
#[instrument(skip(state, ws))]
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut heads = state.aggregator.heads.clone();
    let mut transfers = state.aggregator.transfers.clone();
    heads.mark_unchanged();
    transfers.mark_unchanged();

    info!("WebSocket connection established");

    if let Some(head) = state.aggregator.latest_head() {
        let message = StreamMessage::Block(BlockResponse::from(head));
        if send(&mut socket, &message).await.is_err() {
            return;
        }
    }
    let current = StreamMessage::Transfers(transfers_response(
        &state.aggregator.transfers(),
        STREAM_TRANSFER_LIMIT,
    ));
    if send(&mut socket, &current).await.is_err() {
        return;
    }

    loop {
        let message = tokio::select! {
            changed = heads.changed() => {
                if changed.is_err() {
                    break;
                }
                let head = *heads.borrow_and_update();
                match head {
                    Some(head) => StreamMessage::Block(head.into()),
                    None => continue,
                }
            }
            changed = transfers.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = transfers.borrow_and_update().clone();
                StreamMessage::Transfers(transfers_response(&snapshot, STREAM_TRANSFER_LIMIT))
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed connection");
                    break;
                }
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                    continue;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            },
        };

        if send(&mut socket, &message).await.is_err() {
            warn!("Failed to send message, closing connection");
            break;
        }
    }

    info!("WebSocket connection closed");
}

async fn send(socket: &mut WebSocket, message: &StreamMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize stream message");
            Ok(())
        }
    }
}
