//! Session orchestration: one shared channel, one sidebar, at most one
//! open conversation.
//!
//! The session owns the channel for its whole lifetime; conversation
//! switches only re-announce the join scope and rebuild the per-
//! conversation state. Every history fetch is tagged with the epoch of
//! the conversation it was started for, so a fetch resolving after a
//! switch is discarded instead of corrupting the new conversation.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use parley_net::{Channel, ChannelConfig, ChannelEvent};
use parley_shared::constants::{DEFAULT_PAGE_SIZE, MAX_MESSAGE_CHARS};
use parley_shared::message::ChatMessage;
use parley_shared::protocol::{ClientEvent, SendMessage, ServerEvent};
use parley_shared::types::{UserId, ViewerProfile};

use crate::api::{ApiClient, HistoryPage};
use crate::error::{ApiError, SessionError};
use crate::events::SessionEvent;
use crate::history::{HistoryPager, PageRequest};
use crate::reconcile::{Phase, PushOutcome, Reconciler};
use crate::sidebar::Sidebar;
use crate::viewport::ListChange;

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST base URL.
    pub base_url: String,
    /// Realtime channel settings.
    pub channel: ChannelConfig,
    /// Messages per history page.
    pub page_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7777".to_string(),
            channel: ChannelConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A history fetch tagged with the conversation it was started for.
#[derive(Debug, Clone)]
pub struct HistoryFetch {
    pub peer: UserId,
    pub epoch: u64,
    pub request: PageRequest,
}

/// State scoped to the currently open conversation. Replaced wholesale
/// on every switch.
struct OpenConversation {
    reconciler: Reconciler,
    pager: HistoryPager,
    epoch: u64,
}

/// One signed-in user's messaging session.
pub struct ChatSession {
    config: SessionConfig,
    viewer: ViewerProfile,
    api: ApiClient,
    channel: Option<Channel>,
    channel_rx: Option<broadcast::Receiver<ChannelEvent>>,
    sidebar: Sidebar,
    open: Option<OpenConversation>,
    epoch: u64,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    /// Build a session. No network traffic happens until
    /// [`ChatSession::connect`]. Returns the receiver for the events
    /// the session emits toward the view layer.
    pub fn new(
        config: SessionConfig,
        viewer: ViewerProfile,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let api = ApiClient::new(&config.base_url)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            viewer,
            api,
            channel: None,
            channel_rx: None,
            sidebar: Sidebar::new(),
            open: None,
            epoch: 0,
            event_tx,
        };
        Ok((session, event_rx))
    }

    pub fn viewer(&self) -> &ViewerProfile {
        &self.viewer
    }

    pub fn sidebar(&self) -> &Sidebar {
        &self.sidebar
    }

    /// Messages of the open conversation, oldest first. Empty when no
    /// conversation is open.
    pub fn messages(&self) -> &[ChatMessage] {
        self.open
            .as_ref()
            .map(|o| o.reconciler.messages())
            .unwrap_or(&[])
    }

    pub fn conversation_phase(&self) -> Option<Phase> {
        self.open.as_ref().map(|o| o.reconciler.phase())
    }

    /// Seed the sidebar and open the shared channel in sidebar-only
    /// scope. Idempotent: an already-connected session returns at once.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.channel.is_some() {
            return Ok(());
        }

        let rows = self.api.fetch_conversations().await?;
        self.sidebar.replace_all(rows);
        self.emit(SessionEvent::SidebarChanged);

        let channel = Channel::open(self.config.channel.clone());
        self.channel_rx = Some(channel.subscribe());
        channel
            .join(self.viewer.id.clone(), None)
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        self.channel = Some(channel);

        info!(user = %self.viewer.id, "Session connected");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Conversation lifecycle
    // -----------------------------------------------------------------

    /// Switch the open conversation without touching the network: epoch
    /// bump, fresh reconciler and cursor, optimistic unread reset. The
    /// join announcement and initial page load are driven by
    /// [`ChatSession::open_conversation`].
    pub fn switch_peer(&mut self, peer: UserId) {
        self.epoch += 1;
        self.sidebar.mark_read(&peer);
        self.open = Some(OpenConversation {
            reconciler: Reconciler::new(self.viewer.id.clone(), peer),
            pager: HistoryPager::new(self.config.page_size),
            epoch: self.epoch,
        });
        self.emit(SessionEvent::SidebarChanged);
    }

    /// Open the conversation with `peer`: re-scope the channel join and
    /// load the most recent page.
    pub async fn open_conversation(&mut self, peer: UserId) -> Result<(), SessionError> {
        self.switch_peer(peer.clone());

        let channel = self.channel.as_ref().ok_or(SessionError::ChannelClosed)?;
        channel
            .join(self.viewer.id.clone(), Some(peer))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        self.fetch_history_page().await?;
        Ok(())
    }

    /// Close the open conversation and fall back to sidebar-only scope.
    /// The shared channel stays up.
    pub async fn close_conversation(&mut self) -> Result<(), SessionError> {
        self.epoch += 1;
        self.open = None;

        let channel = self.channel.as_ref().ok_or(SessionError::ChannelClosed)?;
        channel
            .join(self.viewer.id.clone(), None)
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // History pagination
    // -----------------------------------------------------------------

    /// Start a history fetch for the open conversation. Returns `None`
    /// when no conversation is open, a fetch is already in flight, or
    /// no older pages remain.
    pub fn begin_history_fetch(&mut self) -> Option<HistoryFetch> {
        let open = self.open.as_mut()?;
        let request = open.pager.begin()?;
        if request.page == 1 {
            open.reconciler.begin_load();
        }
        Some(HistoryFetch {
            peer: open.reconciler.peer().clone(),
            epoch: open.epoch,
            request,
        })
    }

    /// Apply a completed history fetch. A result belonging to a
    /// conversation that has since been switched away from is discarded
    /// untouched.
    pub fn apply_history_fetch(
        &mut self,
        fetch: &HistoryFetch,
        result: Result<HistoryPage, ApiError>,
    ) {
        let viewer = self.viewer.id.clone();
        let event = {
            let Some(open) = self.open.as_mut() else {
                debug!(peer = %fetch.peer, "Discarding fetch result, no open conversation");
                return;
            };
            if open.epoch != fetch.epoch {
                debug!(peer = %fetch.peer, "Discarding stale history page");
                return;
            }

            match result {
                Ok(page) => {
                    let messages: Vec<ChatMessage> = page
                        .sorted_messages
                        .into_iter()
                        .map(|m| m.into_chat_message(&viewer, &fetch.peer))
                        .collect();
                    let count = messages.len();
                    open.pager.complete(page.has_more);

                    if fetch.request.page == 1 {
                        open.reconciler.seed(messages);
                        SessionEvent::ConversationChanged(ListChange::Reloaded)
                    } else {
                        open.reconciler.prepend_page(messages);
                        SessionEvent::ConversationChanged(ListChange::Prepended { count })
                    }
                }
                Err(e) => {
                    warn!(peer = %fetch.peer, page = fetch.request.page, error = %e, "History fetch failed");
                    open.pager.fail();
                    SessionEvent::Notice {
                        message: format!("Could not load messages: {e}"),
                    }
                }
            }
        };
        self.emit(event);
    }

    /// One begin/fetch/apply cycle against the REST API. Returns `false`
    /// when nothing was fetched (guard or exhausted history).
    pub async fn fetch_history_page(&mut self) -> Result<bool, SessionError> {
        let Some(fetch) = self.begin_history_fetch() else {
            return Ok(false);
        };
        let result = self
            .api
            .fetch_page(&fetch.peer, fetch.request.page, fetch.request.limit)
            .await;
        self.apply_history_fetch(&fetch, result);
        Ok(true)
    }

    // -----------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------

    /// Send a message to the open conversation's peer. The optimistic
    /// echo is appended before the publish; no acknowledgment is
    /// awaited, and the echo is never retroactively replaced.
    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(SessionError::MessageTooLong(MAX_MESSAGE_CHARS));
        }

        let Some(open) = self.open.as_mut() else {
            return Err(SessionError::NoConversation);
        };
        if self.channel.is_none() {
            return Err(SessionError::ChannelClosed);
        }
        let echo = open.reconciler.push_local(&self.viewer, &text);
        let peer = open.reconciler.peer().clone();

        let channel = self.channel.as_ref().ok_or(SessionError::ChannelClosed)?;
        let published = channel
            .publish(ClientEvent::SendMessage(SendMessage {
                user_id: self.viewer.id.clone(),
                to_user_id: peer,
                text,
                first_name: self.viewer.first_name.clone(),
                last_name: self.viewer.last_name.clone(),
            }))
            .await;

        if published.is_err() {
            // The channel task is gone, so the send never left the
            // client. Roll the echo back before the view sees it.
            if let Some(open) = self.open.as_mut() {
                open.reconciler.remove(&echo.id);
            }
            warn!(user = %self.viewer.id, "Publish failed, rolled back local echo");
            return Err(SessionError::ChannelClosed);
        }

        self.emit(SessionEvent::ConversationChanged(ListChange::Appended));
        Ok(echo)
    }

    // -----------------------------------------------------------------
    // Channel events
    // -----------------------------------------------------------------

    /// Await the next channel event. Returns `None` once the channel is
    /// gone. Lagged broadcast slots are logged and skipped.
    pub async fn next_channel_event(&mut self) -> Option<ChannelEvent> {
        let rx = self.channel_rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Channel consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Route one channel event into the reconciler and sidebar.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                debug!("Channel connected");
            }
            ChannelEvent::Event(ServerEvent::MessageReceived(push)) => {
                let outcome = match self.open.as_mut() {
                    Some(open) => open.reconciler.apply_push(push),
                    None => return,
                };
                if outcome == PushOutcome::Appended {
                    self.emit(SessionEvent::ConversationChanged(ListChange::Appended));
                }
            }
            ChannelEvent::Event(ServerEvent::UpdateSidebar(update)) => {
                self.sidebar.apply_update(update);
                self.emit(SessionEvent::SidebarChanged);
            }
            ChannelEvent::Event(ServerEvent::Error(err)) => {
                warn!(message = %err.message, "Server rejected a channel event");
                self.emit(SessionEvent::Notice {
                    message: err.message,
                });
            }
            ChannelEvent::ConnectionError { message } => {
                warn!(error = %message, "Channel transport error");
                self.emit(SessionEvent::ChannelDown { message });
            }
            ChannelEvent::Closed => {
                debug!("Channel task exited");
            }
        }
    }

    /// Drive channel events until the channel closes. Intended to be
    /// `select!`-ed against view input by the embedding layer.
    pub async fn run(&mut self) {
        while let Some(event) = self.next_channel_event().await {
            self.handle_event(event);
        }
    }

    /// End the session. The only place the shared channel dies.
    pub async fn close(&mut self) {
        self.epoch += 1;
        self.open = None;
        self.channel_rx = None;
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        info!(user = %self.viewer.id, "Session closed");
    }

    fn emit(&self, event: SessionEvent) {
        // The view may have dropped its receiver; that is not an error.
        let _ = self.event_tx.send(event);
    }
}
