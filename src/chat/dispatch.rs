use std::collections::HashMap;

use axum::extract::ws::Message;
use thiserror::Error;

use crate::hub::{ConnectionId, Hub, Recipient};
use crate::store::{MessageStore, StoreError};

use super::event::{DeliveryMode, DeliveryPayload, MessageEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("persisting message failed: {0}")]
    PersistenceFailed(#[from] StoreError),
}

/// Persist an inbound message and fan it out.
///
/// The message is stored before any delivery is attempted; a store failure
/// means nobody receives anything. Delivery itself is best-effort per
/// recipient: a push to a connection that closed in the meantime is logged
/// and skipped, it never fails the send as a whole.
///
/// `origin` is the connection the event arrived on. Individual routing never
/// delivers back to it, even when the sender lists themself as a
/// participant.
pub async fn handle_message<S: MessageStore>(
    hub: &Hub,
    store: &S,
    origin: ConnectionId,
    event: MessageEvent,
) -> Result<DeliveryPayload, DispatchError> {
    if event.body.is_empty() {
        return Err(DispatchError::InvalidMessage("empty body"));
    }
    let group_room = match event.delivery_mode {
        DeliveryMode::Group => Some(
            event
                .room_id
                .clone()
                .ok_or(DispatchError::InvalidMessage("group message without a room_id"))?,
        ),
        DeliveryMode::Individual => None,
    };

    let stored = store
        .store(event.room_id.as_deref(), event.sender_user_id, &event.body)
        .await?;

    let payload = DeliveryPayload {
        id: stored.id,
        room_id: event.room_id.clone(),
        sender_user_id: event.sender_user_id,
        body: event.body.clone(),
        created_at: stored.created_at,
    };

    // individual routing consults participants only; a room_id on a direct
    // message is carried in the payload but ignored for routing
    let recipients = match &group_room {
        Some(room_id) => hub.members_of(room_id),
        None => individual_recipients(hub, origin, &event),
    };

    let frame = match serde_json::to_string(&payload) {
        Ok(text) => Message::Text(text.into()),
        Err(err) => {
            tracing::error!(message_id = payload.id, error = %err, "failed to encode delivery payload");
            return Ok(payload);
        }
    };
    for recipient in recipients {
        if recipient.sender.send(frame.clone()).is_err() {
            tracing::warn!(
                connection_id = %recipient.connection_id,
                message_id = payload.id,
                "skipped delivery to closed connection"
            );
        }
    }

    Ok(payload)
}

/// Every live connection of every participant other than the sender, plus
/// the sender's own other devices when the sender appears as a participant.
/// Deduplicated per connection so a user listed twice gets one copy.
fn individual_recipients(hub: &Hub, origin: ConnectionId, event: &MessageEvent) -> Vec<Recipient> {
    let mut picked: HashMap<ConnectionId, Recipient> = HashMap::new();
    for participant in &event.participants {
        for recipient in hub.connections_for_user(participant.id) {
            if participant.id == event.sender_user_id && recipient.connection_id == origin {
                continue;
            }
            picked.entry(recipient.connection_id).or_insert(recipient);
        }
    }
    picked.into_values().collect()
}
