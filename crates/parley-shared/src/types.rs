use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque server-assigned user identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message identifier. Persisted messages carry the server's id;
/// optimistic local echoes carry a client-generated UUID until then.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(String),
    Local(Uuid),
}

impl MessageId {
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => f.write_str(id),
            Self::Local(id) => write!(f, "{id}"),
        }
    }
}

// Local and server ids never collide, so serializing both as plain
// strings is safe for display purposes.
impl Serialize for MessageId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which side of the conversation a message came from. Always derived
/// by comparing the sender id against the viewer id, never taken from
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Own,
    Peer,
}

impl SenderRole {
    pub fn derive(sender: &UserId, viewer: &UserId) -> Self {
        if sender == viewer {
            Self::Own
        } else {
            Self::Peer
        }
    }
}

/// The signed-in user's denormalized profile fields. These are copied
/// into optimistic echoes and into outgoing `sendMessage` payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewerProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

impl ViewerProfile {
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

/// Join first and last name, tolerating a missing last name.
pub fn full_name(first: &str, last: &str) -> String {
    if last.is_empty() {
        first.to_string()
    } else {
        format!("{first} {last}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_role_derivation() {
        let viewer = UserId::from("u1");
        assert_eq!(SenderRole::derive(&UserId::from("u1"), &viewer), SenderRole::Own);
        assert_eq!(SenderRole::derive(&UserId::from("u2"), &viewer), SenderRole::Peer);
    }

    #[test]
    fn message_id_spaces() {
        let local = MessageId::local();
        assert!(local.is_local());
        let server = MessageId::Server("64fa".into());
        assert!(!server.is_local());
        assert_eq!(server.to_string(), "64fa");
    }

    #[test]
    fn full_name_skips_empty_last_name() {
        assert_eq!(full_name("Ada", "Lovelace"), "Ada Lovelace");
        assert_eq!(full_name("Ada", ""), "Ada");
    }
}
