//! The uniform message projection.
//!
//! Three producers feed the conversation view (history fetch, live
//! push, local echo) and each delivers sender fields in a different
//! shape. Normalization happens at each producer's boundary so the
//! merge logic only ever sees this one type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::MessageReceived;
use crate::types::{MessageId, SenderRole, UserId, ViewerProfile};

/// One message of the open conversation, normalized from any producer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    /// The other participant of the conversation this message belongs to.
    pub peer_id: UserId,
    pub role: SenderRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ChatMessage {
    /// Normalize a live push event for the conversation with `peer`.
    pub fn from_push(push: MessageReceived, viewer: &UserId, peer: &UserId) -> Self {
        Self {
            id: MessageId::Server(push.id),
            peer_id: peer.clone(),
            role: SenderRole::derive(&push.sender.id, viewer),
            text: push.text,
            created_at: push.created_at,
            display_name: push.sender.first_name,
            avatar_url: push.sender.photo_url,
        }
    }

    /// Optimistic echo of the viewer's own send, inserted before any
    /// network confirmation.
    pub fn local_echo(profile: &ViewerProfile, peer: &UserId, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::local(),
            peer_id: peer.clone(),
            role: SenderRole::Own,
            text: text.into(),
            created_at: Utc::now(),
            display_name: profile.display_name(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}
