//! Market Data Broadcaster
//!
//! Periodically pulls a snapshot from a [`MarketDataSource`] and pushes it
//! to every authenticated connection as a `market_data` message.
//!
//! Delivery is best-effort: a tick whose snapshot fails is skipped, and
//! missed ticks are never replayed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use folio_core::{MarketSnapshot, ServerMessage};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::market_feed::MarketDataSource;
use crate::websocket::{BroadcastOutcome, ConnectionRegistry};

/// Default time between ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Number of intervals without a successful tick before health degrades
const STALE_TICKS: u32 = 3;

/// Configuration for the MarketBroadcaster
#[derive(Clone, Debug)]
pub struct BroadcasterConfig {
    pub tick_interval: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Most recent snapshot that was broadcast
#[derive(Debug, Clone)]
pub struct LatestSnapshot {
    pub data: Arc<MarketSnapshot>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcaster counters
#[derive(Debug, Clone, Serialize)]
pub struct BroadcasterStats {
    pub source: String,
    pub tick_interval_ms: u64,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub healthy: bool,
}

/// Periodic snapshot producer feeding the connection registry
pub struct MarketBroadcaster {
    source: Arc<dyn MarketDataSource>,
    registry: Arc<ConnectionRegistry>,
    config: BroadcasterConfig,
    latest: RwLock<Option<LatestSnapshot>>,
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
}

impl MarketBroadcaster {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        registry: Arc<ConnectionRegistry>,
        config: BroadcasterConfig,
    ) -> Self {
        Self {
            source,
            registry,
            config,
            latest: RwLock::new(None),
            ticks: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
        }
    }

    /// Run one cycle: generate, wrap, broadcast
    ///
    /// Returns `None` when the source failed and the tick was skipped.
    pub async fn tick(&self) -> Option<BroadcastOutcome> {
        let snapshot = match self.source.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping tick, {} source failed: {}", self.source.name(), e);
                return None;
            }
        };

        let timestamp = Utc::now();
        let data = Arc::new(snapshot);
        *self.latest.write() = Some(LatestSnapshot {
            data: Arc::clone(&data),
            timestamp,
        });

        let message = ServerMessage::MarketData {
            data: Arc::unwrap_or_clone(data),
            timestamp,
        };
        let outcome = self.registry.broadcast(&message);
        self.ticks.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Market tick delivered to {} connections ({} skipped, {} dropped)",
            outcome.delivered, outcome.skipped, outcome.dropped
        );
        Some(outcome)
    }

    /// Start the periodic task
    ///
    /// The first tick fires immediately. The task runs until `shutdown` is
    /// cancelled; connections coming and going never stop it.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "Market broadcaster started ({} source, every {}ms)",
                self.source.name(),
                self.config.tick_interval.as_millis()
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                }
            }

            info!("Market broadcaster stopped");
        })
    }

    /// Most recent snapshot, if any tick has succeeded
    pub fn latest(&self) -> Option<LatestSnapshot> {
        self.latest.read().clone()
    }

    /// Whether ticks are succeeding on schedule
    ///
    /// A broadcaster that has not attempted any tick yet counts as healthy.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Utc::now())
    }

    fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
        let last_tick = self.latest.read().as_ref().map(|l| l.timestamp);
        match last_tick {
            Some(at) => {
                let stale_after = self.config.tick_interval * STALE_TICKS;
                (now - at).to_std().map_or(true, |age| age <= stale_after)
            }
            None => self.skipped_ticks.load(Ordering::Relaxed) == 0,
        }
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            source: self.source.name().to_string(),
            tick_interval_ms: self.config.tick_interval.as_millis() as u64,
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            last_tick: self.latest.read().as_ref().map(|l| l.timestamp),
            healthy: self.is_healthy(),
        }
    }
}

impl std::fmt::Debug for MarketBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketBroadcaster")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}
