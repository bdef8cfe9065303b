//! WebSocket route handler
//!
//! Upgrades `/ws` and adapts the axum socket to the tungstenite message
//! type the connection handler works with.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WireMessage;
use tracing::info;

use crate::AppState;

/// Create WebSocket routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();

    let sink = sender.with(|msg: WireMessage| future::ready(to_axum(msg)));
    let stream = receiver.map(|result| result.map(from_axum));

    state.ws_state.handle_connection(sink, stream).await;
}

fn from_axum(msg: Message) -> WireMessage {
    match msg {
        Message::Text(text) => WireMessage::text(text.as_str()),
        Message::Binary(data) => WireMessage::Binary(data),
        Message::Ping(data) => WireMessage::Ping(data),
        Message::Pong(data) => WireMessage::Pong(data),
        Message::Close(_) => WireMessage::Close(None),
    }
}

fn to_axum(msg: WireMessage) -> Result<Message, axum::Error> {
    match msg {
        WireMessage::Text(text) => Ok(Message::Text(text.as_str().into())),
        WireMessage::Binary(data) => Ok(Message::Binary(data)),
        WireMessage::Ping(data) => Ok(Message::Ping(data)),
        WireMessage::Pong(data) => Ok(Message::Pong(data)),
        WireMessage::Close(_) => Ok(Message::Close(None)),
        WireMessage::Frame(_) => Err(axum::Error::new("raw frames cannot be sent")),
    }
}
