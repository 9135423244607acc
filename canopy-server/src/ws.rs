//! Websocket endpoint for document sync.

use std::future::ready;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use canopy_collab::{serve, Session};
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// Load the room before upgrading so a persistence failure is reported
/// on the handshake.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    Path(doc_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let session = state.registry.get_or_create(&doc_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session)))
}

async fn handle_socket(socket: WebSocket, state: AppState, session: Arc<Session>) {
    let connection_id = Uuid::new_v4();
    let (sender, receiver) = socket.split();

    let incoming = receiver
        .take_while(|msg| ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            ready(match msg {
                Ok(Message::Binary(frame)) => Some(frame),
                _ => None,
            })
        });
    let outgoing =
        sender.with(|frame: Vec<u8>| ready(Ok::<_, axum::Error>(Message::Binary(frame))));

    if let Err(e) = serve(
        state.registry.clone(),
        session,
        connection_id,
        incoming,
        outgoing,
    )
    .await
    {
        log::debug!("connection {connection_id} ended: {e}");
    }
}
