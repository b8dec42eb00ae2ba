//! Events the session emits toward the embedding view layer.

use crate::viewport::ListChange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The open conversation's message list changed. The view maps the
    /// change to a scroll action via [`crate::viewport::plan`].
    ConversationChanged(ListChange),

    /// The sidebar list changed (replace, upsert, or unread reset).
    SidebarChanged,

    /// A transient, dismissable notice: policy rejections and fetch
    /// failures. Never fatal to the session.
    Notice { message: String },

    /// The realtime channel dropped. History fetches keep working.
    ChannelDown { message: String },
}
