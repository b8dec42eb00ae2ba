//! Session-scoped channel with a tokio mpsc command/broadcast pattern.
//!
//! The websocket runs in a dedicated tokio task. External code drives
//! it through a typed command channel and observes it through a
//! broadcast subscription, so the connection is shared by every
//! consumer for the lifetime of the session. Conversation switches
//! re-scope the stream with a new join announcement; only session end
//! tears the connection down.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use parley_shared::constants::{CHANNEL_COMMAND_BUFFER, CHANNEL_EVENT_BUFFER};
use parley_shared::protocol::{ClientEvent, JoinChat, ServerEvent};
use parley_shared::types::UserId;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Announce (or re-announce) the join scope. `to_user_id = None`
    /// listens in sidebar-only mode.
    Join {
        user_id: UserId,
        to_user_id: Option<UserId>,
    },
    /// Fire-and-forget publish. No acknowledgment is awaited here;
    /// callers layer confirmation via optimistic reconciliation.
    Publish(ClientEvent),
    /// Gracefully shut down the channel.
    Shutdown,
}

/// Events published *from* the channel task to its subscribers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The transport finished connecting.
    Connected,
    /// A well-formed server event arrived.
    Event(ServerEvent),
    /// The transport could not be established or failed mid-stream.
    /// Not fatal to the session; REST fetches keep working. An orderly
    /// close is not an error and emits only [`ChannelEvent::Closed`].
    ConnectionError { message: String },
    /// The channel task exited.
    Closed,
}

/// Configuration for opening a channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Websocket endpoint, e.g. `ws://127.0.0.1:7777/ws`.
    pub url: String,
    /// Command queue depth.
    pub command_buffer: usize,
    /// Broadcast buffer depth; slow subscribers may observe lag.
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7777/ws".to_string(),
            command_buffer: CHANNEL_COMMAND_BUFFER,
            event_buffer: CHANNEL_EVENT_BUFFER,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to the session's shared channel.
///
/// Consumers subscribe independently and detach by dropping their
/// receiver, so a torn-down conversation view can never receive stale
/// events. [`Channel::close`] is idempotent and is the only way the
/// connection dies before the task's peer hangs up.
pub struct Channel {
    cmd_tx: mpsc::Sender<ChannelCommand>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl Channel {
    /// Open the channel. Returns the handle immediately; the connection
    /// is established by the background task, and a failure surfaces as
    /// [`ChannelEvent::ConnectionError`] on the event stream rather
    /// than a synchronous error. Commands sent before the connection is
    /// up are queued and flushed once it is.
    pub fn open(config: ChannelConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (event_tx, _) = broadcast::channel(config.event_buffer);
        let task_event_tx = event_tx.clone();

        tokio::spawn(async move {
            run_channel(config, cmd_rx, task_event_tx).await;
        });

        Self { cmd_tx, event_tx }
    }

    /// Subscribe to channel events. Dropping the receiver detaches the
    /// consumer.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }

    /// Announce the join scope. Must be re-invoked whenever the open
    /// peer changes.
    pub async fn join(&self, user_id: UserId, to_user_id: Option<UserId>) -> anyhow::Result<()> {
        self.cmd_tx
            .send(ChannelCommand::Join {
                user_id,
                to_user_id,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Channel task stopped"))
    }

    /// Fire-and-forget publish of a client event.
    pub async fn publish(&self, event: ClientEvent) -> anyhow::Result<()> {
        self.cmd_tx
            .send(ChannelCommand::Publish(event))
            .await
            .map_err(|_| anyhow::anyhow!("Channel task stopped"))
    }

    /// Tear down the channel. Invoked at session end only, never on a
    /// conversation switch.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(ChannelCommand::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_channel(
    config: ChannelConfig,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    event_tx: broadcast::Sender<ChannelEvent>,
) {
    let (ws, _) = match connect_async(&config.url).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(url = %config.url, error = %e, "Channel connect failed");
            let _ = event_tx.send(ChannelEvent::ConnectionError {
                message: e.to_string(),
            });
            let _ = event_tx.send(ChannelEvent::Closed);
            return;
        }
    };

    info!(url = %config.url, "Channel connected");
    let _ = event_tx.send(ChannelEvent::Connected);

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChannelCommand::Join { user_id, to_user_id }) => {
                        debug!(user = %user_id, peer = ?to_user_id, "Joining");
                        let join = ClientEvent::JoinChat(JoinChat { user_id, to_user_id });
                        send_frame(&mut sink, &join, &event_tx).await;
                    }
                    Some(ChannelCommand::Publish(event)) => {
                        send_frame(&mut sink, &event, &event_tx).await;
                    }
                    Some(ChannelCommand::Shutdown) => {
                        info!("Channel shutdown requested");
                        let _ = sink.close().await;
                        break;
                    }
                    None => {
                        // All handles dropped.
                        info!("Command channel closed, shutting down channel");
                        break;
                    }
                }
            }

            frame = stream.next() => {
                if !handle_frame(frame, &event_tx) {
                    break;
                }
            }
        }
    }

    let _ = event_tx.send(ChannelEvent::Closed);
}

async fn send_frame(
    sink: &mut WsSink,
    event: &ClientEvent,
    event_tx: &broadcast::Sender<ChannelEvent>,
) {
    match event.to_json() {
        Ok(json) => {
            if let Err(e) = sink.send(Message::Text(json)).await {
                error!(error = %e, "Publish failed");
                let _ = event_tx.send(ChannelEvent::ConnectionError {
                    message: e.to_string(),
                });
            }
        }
        Err(e) => {
            error!(error = %e, "Event encode failed");
        }
    }
}

/// Process one inbound frame. Returns `false` when the loop should end.
fn handle_frame(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    event_tx: &broadcast::Sender<ChannelEvent>,
) -> bool {
    match frame {
        Some(Ok(Message::Text(raw))) => {
            match ServerEvent::from_json(&raw) {
                Ok(event) => {
                    debug!(len = raw.len(), "Server event received");
                    let _ = event_tx.send(ChannelEvent::Event(event));
                }
                Err(e) => {
                    // Malformed frames never reach the merge logic.
                    warn!(error = %e, "Dropping malformed frame");
                }
            }
            true
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => true,
        Some(Ok(Message::Close(_))) | None => {
            // Orderly close, including the tail of our own close
            // handshake. The loop's final `Closed` covers it; only
            // transport faults become `ConnectionError`.
            info!("Channel closed by server");
            false
        }
        Some(Ok(other)) => {
            warn!(kind = ?other, "Ignoring non-text frame");
            true
        }
        Some(Err(e)) => {
            error!(error = %e, "Channel transport error");
            let _ = event_tx.send(ChannelEvent::ConnectionError {
                message: e.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_shared::protocol::{MessageReceived, PushSender, ServerError};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn join_publish_and_push_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // First frame must be the join announcement.
            let raw = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(raw.contains("\"event\":\"joinChat\""));
            assert!(raw.contains("\"toUserId\":null"));

            // Push a live message back.
            let push = ServerEvent::MessageReceived(MessageReceived {
                id: "m1".into(),
                sender: PushSender {
                    id: UserId::from("u2"),
                    first_name: "Ada".into(),
                    photo_url: None,
                },
                text: "hello".into(),
                created_at: Utc::now(),
            });
            ws.send(Message::Text(push.to_json().unwrap())).await.unwrap();

            // Then expect the client's publish.
            let raw = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(raw.contains("\"event\":\"sendMessage\""));
            assert!(raw.contains("\"text\":\"hi back\""));
        });

        let channel = Channel::open(ChannelConfig {
            url: format!("ws://{addr}"),
            ..Default::default()
        });
        let mut events = channel.subscribe();

        channel.join(UserId::from("u1"), None).await.unwrap();

        loop {
            match events.recv().await.unwrap() {
                ChannelEvent::Connected => {}
                ChannelEvent::Event(ServerEvent::MessageReceived(push)) => {
                    assert_eq!(push.text, "hello");
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        channel
            .publish(ClientEvent::SendMessage(parley_shared::protocol::SendMessage {
                user_id: UserId::from("u1"),
                to_user_id: UserId::from("u2"),
                text: "hi back".into(),
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
            }))
            .await
            .unwrap();

        server.await.unwrap();
        channel.close().await;
    }

    #[tokio::test]
    async fn connect_failure_surfaces_as_event() {
        // Bind then drop so the port is free but nothing listens.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = Channel::open(ChannelConfig {
            url: format!("ws://{addr}"),
            ..Default::default()
        });
        let mut events = channel.subscribe();

        match events.recv().await.unwrap() {
            ChannelEvent::ConnectionError { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        match events.recv().await.unwrap() {
            ChannelEvent::Closed => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_initiated_close_is_not_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let channel = Channel::open(ChannelConfig {
            url: format!("ws://{addr}"),
            ..Default::default()
        });
        let mut events = channel.subscribe();

        loop {
            match events.recv().await.unwrap() {
                ChannelEvent::Connected => {}
                ChannelEvent::Closed => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_event_is_delivered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // Malformed frame first: it must be dropped, not kill the loop.
            ws.send(Message::Text("{\"event\":\"bogus\"}".into()))
                .await
                .unwrap();

            let err = ServerEvent::Error(ServerError {
                message: "You can only chat with connections".into(),
            });
            ws.send(Message::Text(err.to_json().unwrap())).await.unwrap();
        });

        let channel = Channel::open(ChannelConfig {
            url: format!("ws://{addr}"),
            ..Default::default()
        });
        let mut events = channel.subscribe();

        loop {
            match events.recv().await.unwrap() {
                ChannelEvent::Connected => {}
                ChannelEvent::Event(ServerEvent::Error(err)) => {
                    assert_eq!(err.message, "You can only chat with connections");
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        server.await.unwrap();
        channel.close().await;
    }
}
