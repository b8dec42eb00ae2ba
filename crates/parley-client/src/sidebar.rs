//! Session-lifetime conversation summary list.
//!
//! Seeded once per session by a full REST fetch, then updated
//! incrementally by channel events. The two sources are reconciled by
//! upsert-by-peer-id only; the peer id is a stable unique key, so no
//! id-merge is needed. The list outlives every conversation switch.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::protocol::{SidebarUpdate, SidebarUpdateKind};
use parley_shared::types::{full_name, UserId};

use crate::api::ConversationRow;

/// One sidebar row: peer plus the latest activity summary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SidebarEntry {
    pub peer_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

impl From<ConversationRow> for SidebarEntry {
    fn from(row: ConversationRow) -> Self {
        Self {
            peer_id: row.id,
            display_name: full_name(&row.first_name, &row.last_name),
            avatar_url: row.photo_url,
            last_message: row.last_message,
            last_message_time: row.last_message_time,
            unread_count: row.unread_count,
        }
    }
}

/// Most-recent-activity-first list of conversation summaries.
#[derive(Debug, Default)]
pub struct Sidebar {
    entries: Vec<SidebarEntry>,
}

impl Sidebar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SidebarEntry] {
        &self.entries
    }

    /// Full replace from the once-per-session REST fetch.
    pub fn replace_all(&mut self, rows: Vec<ConversationRow>) {
        self.entries = rows.into_iter().map(Into::into).collect();
    }

    /// Upsert by peer id and move the affected entry to the front.
    /// `received` bumps the unread badge, `sent` clears it.
    pub fn apply_update(&mut self, update: SidebarUpdate) {
        if let Some(pos) = self.entries.iter().position(|e| e.peer_id == update.peer_id) {
            let mut entry = self.entries.remove(pos);
            entry.last_message = Some(update.last_message);
            entry.last_message_time = Some(update.last_message_time);
            match update.direction {
                SidebarUpdateKind::Received => entry.unread_count += 1,
                SidebarUpdateKind::Sent => entry.unread_count = 0,
            }
            self.entries.insert(0, entry);
        } else {
            // First event for a previously-unseen peer: build the entry
            // from the embedded sender fields.
            self.entries.insert(
                0,
                SidebarEntry {
                    peer_id: update.peer_id,
                    display_name: full_name(&update.first_name, &update.last_name),
                    avatar_url: update.photo_url,
                    last_message: Some(update.last_message),
                    last_message_time: Some(update.last_message_time),
                    unread_count: update.unread_count,
                },
            );
        }
    }

    /// Optimistically clear the unread badge when the conversation is
    /// opened, independent of any server acknowledgment.
    pub fn mark_read(&mut self, peer: &UserId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.peer_id == *peer) {
            entry.unread_count = 0;
        }
    }
}
