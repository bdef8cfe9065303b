//! WebSocket infrastructure for real-time market data
//!
//! This module provides the connection registry and the per-connection
//! handler used by the `/ws` endpoint.

mod handler;
mod registry;

pub use handler::{WebSocketState, DEFAULT_OUTBOUND_BUFFER};
pub use registry::{
    BroadcastOutcome, ConnectionId, ConnectionRegistry, Frame, RegistryError, RegistryStats,
};
