//! Wire protocol for the real-time channel.
//!
//! Every frame is a JSON text message tagged by an `event` field with
//! the payload under `data`. Client and server event sets are disjoint:
//! the client announces joins and publishes sends, the server pushes
//! live messages, sidebar updates, and policy errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::UserId;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Events published by the client on the shared channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Scope the event stream to a conversation (or sidebar-only mode).
    JoinChat(JoinChat),

    /// Fire-and-forget send of a message body.
    SendMessage(SendMessage),
}

/// Join announcement. `to_user_id = None` means sidebar-only mode:
/// listen for cross-conversation updates without being scoped to a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinChat {
    pub user_id: UserId,
    pub to_user_id: Option<UserId>,
}

/// Outgoing message. The sender's name travels with the payload so the
/// server can fan out sidebar updates without a profile lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub user_id: UserId,
    pub to_user_id: UserId,
    pub text: String,
    pub first_name: String,
    pub last_name: String,
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Events pushed by the server over the shared channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A live message for the joined conversation.
    MessageReceived(MessageReceived),

    /// A conversation summary changed (any conversation, any scope).
    UpdateSidebar(SidebarUpdate),

    /// The server rejected a client event (e.g. messaging a non-connection).
    Error(ServerError),
}

/// Live push shape. Unlike history rows, the sender arrives as flat
/// fields with no last name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceived {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "senderId")]
    pub sender: PushSender,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushSender {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Sidebar upsert payload, delivered regardless of which conversation
/// (if any) is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidebarUpdate {
    #[serde(rename = "_id")]
    pub peer_id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub direction: SidebarUpdateKind,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SidebarUpdateKind {
    /// A message from the peer; bumps the unread badge.
    Received,
    /// Confirmation of the viewer's own send; clears the badge.
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerError {
    pub message: String,
}

impl ServerEvent {
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_chat_frame_shape() {
        let event = ClientEvent::JoinChat(JoinChat {
            user_id: UserId::from("u1"),
            to_user_id: None,
        });
        let json = event.to_json().unwrap();
        assert!(json.contains("\"event\":\"joinChat\""));
        assert!(json.contains("\"toUserId\":null"));
    }

    #[test]
    fn send_message_frame_shape() {
        let event = ClientEvent::SendMessage(SendMessage {
            user_id: UserId::from("u1"),
            to_user_id: UserId::from("u2"),
            text: "hello".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        });
        let json = event.to_json().unwrap();
        assert!(json.contains("\"event\":\"sendMessage\""));
        assert!(json.contains("\"firstName\":\"Ada\""));
    }

    #[test]
    fn decode_message_received() {
        let raw = r#"{
            "event": "messageReceived",
            "data": {
                "_id": "m1",
                "senderId": { "_id": "u2", "firstName": "Ada", "photoUrl": null },
                "text": "hi there",
                "createdAt": "2025-01-01T10:00:00Z"
            }
        }"#;
        match ServerEvent::from_json(raw).unwrap() {
            ServerEvent::MessageReceived(push) => {
                assert_eq!(push.id, "m1");
                assert_eq!(push.sender.id, UserId::from("u2"));
                assert_eq!(push.text, "hi there");
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn decode_sidebar_update() {
        let raw = r#"{
            "event": "updateSidebar",
            "data": {
                "_id": "u2",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "photoUrl": "https://example.com/a.png",
                "lastMessage": "see you",
                "lastMessageTime": "2025-01-01T10:05:00Z",
                "type": "received",
                "unreadCount": 0
            }
        }"#;
        match ServerEvent::from_json(raw).unwrap() {
            ServerEvent::UpdateSidebar(update) => {
                assert_eq!(update.peer_id, UserId::from("u2"));
                assert_eq!(update.direction, SidebarUpdateKind::Received);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn decode_error_event() {
        let raw = r#"{"event":"error","data":{"message":"You can only chat with connections"}}"#;
        match ServerEvent::from_json(raw).unwrap() {
            ServerEvent::Error(err) => {
                assert_eq!(err.message, "You can only chat with connections");
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_is_rejected() {
        assert!(ServerEvent::from_json("{\"event\":\"unknown\"}").is_err());
        assert!(ServerEvent::from_json("not json").is_err());
    }
}
