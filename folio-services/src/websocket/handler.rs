//! WebSocket connection handler
//!
//! Drives a single client connection: registers it, runs the writer task
//! that drains its outbound queue, and processes inbound auth messages
//! until the connection ends.

use std::fmt::Display;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use folio_core::{AlertVariant, ClientMessage, ServerMessage, UserId};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::registry::{BroadcastOutcome, ConnectionId, ConnectionRegistry, Frame};

/// Default capacity of each connection's outbound queue
pub const DEFAULT_OUTBOUND_BUFFER: usize = 100;

/// How long the writer may keep flushing queued frames after the reader stops
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared state for WebSocket handlers
#[derive(Clone)]
pub struct WebSocketState {
    /// Open connections
    pub registry: Arc<ConnectionRegistry>,
    /// Outbound queue capacity per connection
    outbound_buffer: usize,
}

impl WebSocketState {
    /// Create new WebSocket state around a registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }

    /// Set the per-connection outbound queue capacity
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity.max(1);
        self
    }

    /// Handle an established WebSocket connection
    ///
    /// Returns once the client goes away, the transport fails, or the
    /// writer can no longer send. The connection is unregistered on every
    /// exit path.
    pub async fn handle_connection<S, R, E>(&self, sink: S, mut stream: R)
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: Display + Send,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(self.outbound_buffer);
        let id = self.registry.register(outbound_tx);

        let mut send_task = tokio::spawn(write_frames(id, sink, outbound_rx));
        let mut writer_done = false;

        loop {
            tokio::select! {
                _ = &mut send_task => {
                    debug!("Writer for {} finished", id);
                    writer_done = true;
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(msg)) => {
                        if self.handle_message(id, msg).is_break() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error for {}: {}", id, e);
                        break;
                    }
                    None => break,
                }
            }
        }

        // Dropping the registry entry closes the queue, so the writer
        // flushes what is left and closes the sink.
        self.registry.unregister(id);
        if !writer_done
            && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
                .await
                .is_err()
        {
            debug!("Writer for {} did not drain in time, aborting", id);
            send_task.abort();
        }
        info!("WebSocket connection closed: {}", id);
    }

    /// Handle an incoming WebSocket message
    fn handle_message(&self, id: ConnectionId, msg: Message) -> ControlFlow<()> {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Auth {
                    user_id: Some(user_id),
                }) => match self.registry.authenticate(id, user_id) {
                    Ok(()) => {}
                    Err(e) => {
                        debug!("Dropping {} after failed auth: {}", id, e);
                        return ControlFlow::Break(());
                    }
                },
                Ok(ClientMessage::Auth { user_id: None }) => {
                    debug!("Auth message from {} without userId, ignoring", id);
                }
                Err(e) => {
                    debug!("Ignoring unrecognized message from {}: {}", id, e);
                }
            },
            Message::Binary(_) => {
                debug!("Ignoring binary message from {}", id);
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Handled automatically by tungstenite
            }
            Message::Close(_) => {
                debug!("Received close from {}", id);
                return ControlFlow::Break(());
            }
            Message::Frame(_) => {}
        }

        ControlFlow::Continue(())
    }

    /// Push a `portfolio_update` to one user, or to everyone when `user_id` is None
    pub fn notify_portfolio_update(
        &self,
        user_id: Option<UserId>,
        message: impl Into<String>,
    ) -> BroadcastOutcome {
        self.push(user_id, ServerMessage::portfolio_update(message))
    }

    /// Push an `alert` to one user, or to everyone when `user_id` is None
    pub fn notify_alert(
        &self,
        user_id: Option<UserId>,
        title: impl Into<String>,
        message: impl Into<String>,
        variant: AlertVariant,
    ) -> BroadcastOutcome {
        self.push(user_id, ServerMessage::alert(title, message, variant))
    }

    fn push(&self, user_id: Option<UserId>, message: ServerMessage) -> BroadcastOutcome {
        match user_id {
            Some(user_id) => self.registry.send_to_user(user_id, &message),
            None => self.registry.broadcast(&message),
        }
    }
}

/// Drain a connection's outbound queue into its sink
async fn write_frames<S>(id: ConnectionId, mut sink: S, mut outbound_rx: mpsc::Receiver<Frame>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = outbound_rx.recv().await {
        if let Err(e) = sink.send(Message::text(frame.to_string())).await {
            warn!("Failed to send to {}: {}", id, e);
            return;
        }
    }

    let _ = sink.close().await;
}

impl std::fmt::Debug for WebSocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketState")
            .field("registry", &self.registry)
            .field("outbound_buffer", &self.outbound_buffer)
            .finish()
    }
}
