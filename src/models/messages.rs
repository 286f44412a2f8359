use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rtc::signal::{SignalEnvelope, SignalPayload};

/// Events a client sends over a room's live channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Whole-document overwrite of the room content. Last write wins.
    Edit { content: String },
    /// Caret moved; 1-indexed line and column
    Cursor { line: u32, column: u32 },
    /// Presence refresh, expected every 30 seconds while in the room
    Heartbeat { audio_active: bool },
    Chat { content: String },
    /// Append a signaling message to the addressee's mailbox
    Signal { to: String, payload: SignalPayload },
    /// Confirm a signaling message was fully processed so the server
    /// deletes it from the mailbox
    SignalAck { id: Uuid },
}

/// A participant's presence record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub display_name: String,
    pub audio_active: bool,
    /// Milliseconds since the epoch of the last heartbeat
    pub last_active: i64,
}

/// A participant's caret position, overwritten in place on every move
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorEntry {
    pub user_id: String,
    pub display_name: String,
    pub line: u32,
    pub column: u32,
    pub last_updated: i64,
}

/// A chat message within a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub sender: String,
    pub display_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The room document as broadcast to subscribers on every change,
/// including changes caused by the receiver's own write. Receivers must
/// apply it idempotently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub room_name: String,
    pub language: String,
    pub content: String,
    pub is_private: bool,
    pub is_active: bool,
    pub created_by: String,
    pub muted_users: Vec<String>,
}

/// Events the server pushes to room subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Room(RoomSnapshot),
    Presence { users: Vec<PresenceEntry> },
    Cursor(CursorEntry),
    Chat(ChatEntry),
    Members { members: Vec<super::MemberEntry> },
    Signal(SignalEnvelope),
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_tags_are_snake_case() {
        let json = serde_json::to_value(ClientEvent::Heartbeat { audio_active: true }).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["audio_active"], true);

        let json = serde_json::to_value(ClientEvent::SignalAck { id: Uuid::nil() }).unwrap();
        assert_eq!(json["type"], "signal_ack");
    }

    #[test]
    fn signal_event_nests_tagged_payload() {
        let ev = ClientEvent::Signal {
            to: "bob".to_string(),
            payload: SignalPayload::Offer { sdp: "sdp".to_string() },
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "signal");
        assert_eq!(json["payload"]["type"], "offer");
        let back: ClientEvent = serde_json::from_value(json).unwrap();
        match back {
            ClientEvent::Signal { to, payload } => {
                assert_eq!(to, "bob");
                assert_eq!(payload.kind(), "offer");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn room_event_round_trips() {
        let ev = ServerEvent::Room(RoomSnapshot {
            room_id: "ABC123".to_string(),
            room_name: "demo".to_string(),
            language: "python".to_string(),
            content: "print('hi')".to_string(),
            is_private: false,
            is_active: true,
            created_by: "alice".to_string(),
            muted_users: vec!["bob".to_string()],
        });
        let text = serde_json::to_string(&ev).unwrap();
        let back: ServerEvent = serde_json::from_str(&text).unwrap();
        match back {
            ServerEvent::Room(snapshot) => {
                assert_eq!(snapshot.room_id, "ABC123");
                assert_eq!(snapshot.muted_users, vec!["bob".to_string()]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
