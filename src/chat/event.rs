use serde::{Deserialize, Serialize};

use crate::hub::{RoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Group,
    Individual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
}

/// An inbound chat message as sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub delivery_mode: DeliveryMode,
    pub sender_user_id: UserId,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub body: String,
}

/// Frames a client may send over its socket, tagged by `event`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientEvent {
    Join { room_id: RoomId },
    Leave { room_id: RoomId },
    Message(MessageEvent),
}

/// What every recipient of a message receives. `id` and `created_at` come
/// from the store, so all recipients observe the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub id: i64,
    pub room_id: Option<RoomId>,
    pub sender_user_id: UserId,
    pub body: String,
    pub created_at: i64,
}

/// Sent back on the originating socket only, when its own event is rejected.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_parses() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"join","room_id":"r1"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Join { room_id } if room_id == "r1"));
    }

    #[test]
    fn message_frame_parses() {
        let raw = r#"{
            "event": "message",
            "room_id": "r1",
            "delivery_mode": "group",
            "sender_user_id": 1,
            "participants": [{"id": 2}],
            "body": "hi"
        }"#;
        let ClientEvent::Message(msg) = serde_json::from_str(raw).unwrap() else {
            panic!("expected a message frame");
        };
        assert_eq!(msg.room_id.as_deref(), Some("r1"));
        assert_eq!(msg.delivery_mode, DeliveryMode::Group);
        assert_eq!(msg.sender_user_id, 1);
        assert_eq!(msg.participants.len(), 1);
        assert_eq!(msg.body, "hi");
    }

    #[test]
    fn direct_message_omits_room() {
        let raw = r#"{
            "event": "message",
            "delivery_mode": "individual",
            "sender_user_id": 1,
            "participants": [{"id": 2}],
            "body": "hey"
        }"#;
        let ClientEvent::Message(msg) = serde_json::from_str(raw).unwrap() else {
            panic!("expected a message frame");
        };
        assert_eq!(msg.room_id, None);
        assert_eq!(msg.delivery_mode, DeliveryMode::Individual);
    }

    #[test]
    fn unknown_delivery_mode_is_rejected() {
        let raw = r#"{"event":"message","delivery_mode":"multicast","sender_user_id":1,"body":"x"}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }
}
