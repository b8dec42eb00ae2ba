//! Merge of the three message producers into one ordered view.
//!
//! The reconciler is the single owner of the open conversation's
//! message list. Fetched history seeds and prepends, local sends append
//! optimistically, and live pushes append after filtering. One instance
//! exists per open conversation; switching peers discards it wholesale,
//! so no state can leak across conversations.

use tracing::debug;

use parley_shared::message::ChatMessage;
use parley_shared::protocol::MessageReceived;
use parley_shared::types::{MessageId, SenderRole, UserId, ViewerProfile};

/// Load phase of the open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Loading,
    Ready,
}

/// Outcome of feeding a live push into the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended as the newest message.
    Appended,
    /// Echo of the viewer's own send arriving back over the channel.
    /// The optimistic local copy is authoritative, so the echo is
    /// dropped. Matching is by sender identity, never by text, so two
    /// identical consecutive peer messages both survive.
    DroppedOwnEcho,
    /// Event for a different conversation than the open one.
    DroppedForeign,
}

/// Ordered, de-duplicated message list for the open conversation.
#[derive(Debug)]
pub struct Reconciler {
    viewer: UserId,
    peer: UserId,
    phase: Phase,
    messages: Vec<ChatMessage>,
}

impl Reconciler {
    pub fn new(viewer: UserId, peer: UserId) -> Self {
        Self {
            viewer,
            peer,
            phase: Phase::Empty,
            messages: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn peer(&self) -> &UserId {
        &self.peer
    }

    /// The list, oldest first. Chronological at all times.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Mark the initial page fetch as started.
    pub fn begin_load(&mut self) {
        if self.phase == Phase::Empty {
            self.phase = Phase::Loading;
        }
    }

    /// Seed from page 1. Replaces the whole set and enters `Ready`;
    /// re-applying the same page is idempotent by construction.
    pub fn seed(&mut self, page: Vec<ChatMessage>) {
        debug_assert!(is_chronological(&page));
        self.messages = page;
        self.phase = Phase::Ready;
    }

    /// Prepend an older page. Every prepended message is older than the
    /// current earliest, so chronology is preserved.
    pub fn prepend_page(&mut self, mut older: Vec<ChatMessage>) {
        if older.is_empty() {
            return;
        }
        debug_assert!(is_chronological(&older));
        debug_assert!(match (older.last(), self.messages.first()) {
            (Some(newest_old), Some(earliest)) => newest_old.created_at <= earliest.created_at,
            _ => true,
        });
        older.append(&mut self.messages);
        self.messages = older;
    }

    /// Append the viewer's optimistic echo. Returns a clone so the
    /// caller can hand it to the transport or the view.
    pub fn push_local(&mut self, profile: &ViewerProfile, text: &str) -> ChatMessage {
        let msg = ChatMessage::local_echo(profile, &self.peer, text);
        self.messages.push(msg.clone());
        msg
    }

    /// Remove a message by id. Used to roll back an optimistic echo
    /// whose publish never left the client.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        self.messages.len() != before
    }

    /// Feed a live push event. An appended message is always treated as
    /// the newest, regardless of the arrival order of competing fetches.
    pub fn apply_push(&mut self, push: MessageReceived) -> PushOutcome {
        if SenderRole::derive(&push.sender.id, &self.viewer) == SenderRole::Own {
            debug!(id = %push.id, "Dropping own echo from channel");
            return PushOutcome::DroppedOwnEcho;
        }
        if push.sender.id != self.peer {
            debug!(sender = %push.sender.id, "Dropping push for another conversation");
            return PushOutcome::DroppedForeign;
        }

        let msg = ChatMessage::from_push(push, &self.viewer, &self.peer);
        self.messages.push(msg);
        PushOutcome::Appended
    }
}

fn is_chronological(messages: &[ChatMessage]) -> bool {
    messages
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use parley_shared::protocol::PushSender;
    use parley_shared::types::MessageId;

    fn viewer_profile() -> ViewerProfile {
        ViewerProfile {
            id: UserId::from("u1"),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            avatar_url: None,
        }
    }

    fn peer_message(id: &str, minutes_ago: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId::Server(id.into()),
            peer_id: UserId::from("u2"),
            role: SenderRole::Peer,
            text: format!("msg {id}"),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            display_name: "Ada".into(),
            avatar_url: None,
        }
    }

    fn push_from(sender: &str, id: &str, text: &str) -> MessageReceived {
        MessageReceived {
            id: id.into(),
            sender: PushSender {
                id: UserId::from(sender),
                first_name: "Someone".into(),
                photo_url: None,
            },
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(UserId::from("u1"), UserId::from("u2"))
    }

    #[test]
    fn phases_advance_empty_loading_ready() {
        let mut rec = reconciler();
        assert_eq!(rec.phase(), Phase::Empty);
        rec.begin_load();
        assert_eq!(rec.phase(), Phase::Loading);
        rec.seed(vec![peer_message("m1", 10)]);
        assert_eq!(rec.phase(), Phase::Ready);
    }

    #[test]
    fn list_stays_chronological_through_seed_prepend_append() {
        let mut rec = reconciler();
        rec.seed(vec![peer_message("m3", 30), peer_message("m4", 20)]);
        rec.prepend_page(vec![peer_message("m1", 60), peer_message("m2", 50)]);
        rec.apply_push(push_from("u2", "m5", "newest"));
        rec.push_local(&viewer_profile(), "newer still");

        let times: Vec<_> = rec.messages().iter().map(|m| m.created_at).collect();
        assert_eq!(times.len(), 6);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(rec.messages()[0].id, MessageId::Server("m1".into()));
    }

    #[test]
    fn own_echo_is_dropped_once() {
        let mut rec = reconciler();
        rec.seed(vec![]);
        rec.push_local(&viewer_profile(), "hello there");

        let outcome = rec.apply_push(push_from("u1", "m9", "hello there"));
        assert_eq!(outcome, PushOutcome::DroppedOwnEcho);

        let copies = rec
            .messages()
            .iter()
            .filter(|m| m.text == "hello there" && m.role == SenderRole::Own)
            .count();
        assert_eq!(copies, 1);
    }

    #[test]
    fn identical_peer_texts_are_not_deduplicated() {
        // De-dup is by sender identity; two identical consecutive texts
        // from the peer must both survive.
        let mut rec = reconciler();
        rec.seed(vec![]);
        assert_eq!(rec.apply_push(push_from("u2", "m1", "ok")), PushOutcome::Appended);
        assert_eq!(rec.apply_push(push_from("u2", "m2", "ok")), PushOutcome::Appended);
        assert_eq!(rec.messages().len(), 2);
    }

    #[test]
    fn foreign_conversation_push_is_dropped() {
        let mut rec = reconciler();
        rec.seed(vec![]);
        let outcome = rec.apply_push(push_from("u3", "m1", "wrong chat"));
        assert_eq!(outcome, PushOutcome::DroppedForeign);
        assert!(rec.messages().is_empty());
    }

    #[test]
    fn reapplying_page_one_is_idempotent() {
        let page = vec![peer_message("m1", 20), peer_message("m2", 10)];
        let mut rec = reconciler();
        rec.seed(page.clone());
        let first = rec.messages().to_vec();
        rec.seed(page);
        assert_eq!(rec.messages(), first.as_slice());
    }

    #[test]
    fn empty_prepend_is_a_no_op() {
        let mut rec = reconciler();
        rec.seed(vec![peer_message("m1", 5)]);
        rec.prepend_page(vec![]);
        assert_eq!(rec.messages().len(), 1);
    }
}
