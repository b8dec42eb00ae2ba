//! REST client for message history and conversation summaries.
//!
//! Auth is cookie-based; a 401 triggers one silent refresh-and-replay
//! before the error is surfaced. History rows are normalized into the
//! uniform [`ChatMessage`] projection here, at the fetch boundary.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use parley_shared::message::ChatMessage;
use parley_shared::types::{full_name, MessageId, SenderRole, UserId};

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// One row of fetched history. Unlike the live push shape, the sender
/// arrives as a nested object with both name parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "senderId")]
    pub sender: HistorySender,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySender {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl HistoryMessage {
    /// Normalize into the uniform projection for the conversation with
    /// `peer`, as seen by `viewer`.
    pub fn into_chat_message(self, viewer: &UserId, peer: &UserId) -> ChatMessage {
        ChatMessage {
            id: MessageId::Server(self.id),
            peer_id: peer.clone(),
            role: SenderRole::derive(&self.sender.id, viewer),
            text: self.text,
            created_at: self.created_at,
            display_name: full_name(&self.sender.first_name, &self.sender.last_name),
            avatar_url: self.sender.photo_url,
        }
    }
}

/// One page of history. Messages are ordered oldest-to-newest within
/// the page; page 1 is the most recent window.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub sorted_messages: Vec<HistoryMessage>,
    pub has_more: bool,
}

/// A conversation summary row from `GET /chat/users`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    /// Refresh generation. Concurrent 401s queue on the lock; whoever
    /// wins refreshes and bumps the counter, and the queued callers see
    /// the bump and replay without a redundant refresh of their own.
    refresh_gen: Mutex<u64>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            refresh_gen: Mutex::new(0),
        })
    }

    /// Fetch one page of history for the conversation with `peer`.
    pub async fn fetch_page(
        &self,
        peer: &UserId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, ApiError> {
        let url = format!("{}/chat/{}", self.base_url, peer);
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        debug!(peer = %peer, page, limit, "Fetching history page");
        let resp = self.get_with_refresh(&url, &query).await?;
        Ok(resp.json::<HistoryPage>().await?)
    }

    /// Fetch the full conversation summary list. Called once per
    /// session; afterwards the sidebar is updated incrementally over
    /// the channel.
    pub async fn fetch_conversations(&self) -> Result<Vec<ConversationRow>, ApiError> {
        let url = format!("{}/chat/users", self.base_url);
        let resp = self.get_with_refresh(&url, &[]).await?;
        Ok(resp.json().await?)
    }

    /// GET with one silent refresh-and-replay on 401. A second 401
    /// propagates as [`ApiError::Unauthorized`].
    async fn get_with_refresh(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ApiError> {
        let observed = *self.refresh_gen.lock().await;
        let resp = self.http.get(url).query(query).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp);
        }

        warn!(url, "Got 401, refreshing session");
        self.refresh(observed).await?;

        let retried = self.http.get(url).query(query).send().await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        check_status(retried)
    }

    /// POST `/refreshToken`, unless the generation already moved past
    /// `observed` — then another caller refreshed while we queued and
    /// the replay can ride on its result.
    async fn refresh(&self, observed: u64) -> Result<(), ApiError> {
        let mut generation = self.refresh_gen.lock().await;
        if *generation != observed {
            debug!("Session already refreshed by a concurrent caller");
            return Ok(());
        }
        let resp = self
            .http
            .post(format!("{}/refreshToken", self.base_url))
            .send()
            .await?;
        if resp.status().is_success() {
            *generation += 1;
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ApiError::Status(status))
    }
}
