use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::hub::{ConnectionId, ConnectionSender, UserId};
use crate::session::USER_ID;
use crate::{AppResult, AppState};

use super::dispatch;
use super::event::{ClientEvent, ErrorPayload};

/// Upgrade handler. The session is established by the auth layer; a socket
/// without a logged-in user is refused before the upgrade.
#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(state): State<AppState>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<UserId>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    Ok(ws.on_upgrade(move |socket| run_connection(socket, state, user_id)))
}

/// One actor per connection: a writer task owns the sink and drains the
/// connection's channel, the reader loop handles inbound frames. On exit the
/// connection is removed from every room it joined and unregistered in one
/// step, so an in-flight fan-out sees it either fully present or fully gone.
async fn run_connection(socket: WebSocket, state: AppState, user_id: UserId) {
    let connection_id = Uuid::now_v7();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    if let Err(err) = state.hub.register(connection_id, user_id, tx.clone()) {
        tracing::warn!(connection_id = %connection_id, error = %err, "registration refused");
        return;
    }
    tracing::info!(connection_id = %connection_id, user_id, "connection opened");

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_frame(&state, connection_id, user_id, &tx, text.as_str()).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {} // pings and pongs are handled by the transport
            Some(Err(err)) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "socket receive error");
                break;
            }
        }
    }

    writer_task.abort();

    match state.hub.unregister(connection_id) {
        Ok(rooms) => tracing::info!(
            connection_id = %connection_id,
            user_id,
            rooms = rooms.len(),
            "connection closed"
        ),
        Err(err) => tracing::warn!(connection_id = %connection_id, error = %err, "disconnect cleanup skipped"),
    }
}

async fn handle_frame(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: UserId,
    tx: &ConnectionSender,
    text: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(connection_id = %connection_id, error = %err, "malformed frame");
            send_error(tx, &format!("invalid message: {err}"));
            return;
        }
    };

    match event {
        ClientEvent::Join { room_id } => match state.hub.join(&room_id, connection_id) {
            Ok(()) => tracing::info!(connection_id = %connection_id, %room_id, "joined room"),
            Err(err) => tracing::warn!(connection_id = %connection_id, %room_id, error = %err, "join refused"),
        },
        ClientEvent::Leave { room_id } => {
            state.hub.leave(&room_id, connection_id);
            tracing::info!(connection_id = %connection_id, %room_id, "left room");
        }
        ClientEvent::Message(event) => {
            if let Err(err) =
                dispatch::handle_message(&state.hub, &state.store, connection_id, event).await
            {
                tracing::warn!(connection_id = %connection_id, user_id, error = %err, "message rejected");
                send_error(tx, &err.to_string());
            }
        }
    }
}

/// Rejections go back on the originating socket only.
fn send_error(tx: &ConnectionSender, error: &str) {
    if let Ok(text) = serde_json::to_string(&ErrorPayload {
        error: error.to_owned(),
    }) {
        let _ = tx.send(Message::Text(text.into()));
    }
}
