//! Real-time services for Folio
//!
//! This crate owns the connection registry, the WebSocket connection
//! handler, and the periodic market data broadcaster.

pub mod broadcaster;
pub mod market_feed;
pub mod websocket;

pub use broadcaster::{
    BroadcasterConfig, BroadcasterStats, LatestSnapshot, MarketBroadcaster, DEFAULT_TICK_INTERVAL,
};
pub use market_feed::{MarketDataSource, SimulatedMarketFeed};
pub use websocket::{
    BroadcastOutcome, ConnectionId, ConnectionRegistry, Frame, RegistryError, RegistryStats,
    WebSocketState,
};
