//! Core types for Folio's real-time channel
//!
//! This crate defines the shared data structures used across the server,
//! including market snapshots and the WebSocket wire protocol.

pub mod error;
pub mod market;
pub mod websocket;

pub use error::{FolioError, FolioResult};
pub use market::{IndexQuote, MarketSnapshot, SectorPerformance, TopMover};
pub use websocket::{AlertVariant, ClientMessage, ConnectionState, ServerMessage, UserId};
