//! Connection registry for WebSocket clients
//!
//! Tracks open connections and their authentication state, and fans
//! serialized messages out to the connections that should receive them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_core::{ConnectionState, FolioResult, ServerMessage, UserId};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

/// A serialized message queued for one connection
///
/// Broadcasts serialize once and share the same frame across connections.
pub type Frame = Arc<str>;

/// Unique identifier for a WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),
}

/// Result of fanning one message out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    /// Frames queued successfully
    pub delivered: usize,
    /// Connections whose queue was full; the frame was dropped for them
    pub skipped: usize,
    /// Connections found closed and removed from the registry
    pub dropped: usize,
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub authenticated: usize,
    /// Distinct users across authenticated connections
    pub users: usize,
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub connections_dropped: u64,
}

/// Registry-owned state for one connection
#[derive(Debug)]
struct Connection {
    user_id: Option<UserId>,
    outbound: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

impl Connection {
    fn state(&self) -> ConnectionState {
        match self.user_id {
            Some(_) => ConnectionState::Authenticated,
            None => ConnectionState::Unauthenticated,
        }
    }

    fn deliver(&self, frame: &Frame) -> Delivery {
        match self.outbound.try_send(Arc::clone(frame)) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Set of open connections and their authentication state
///
/// All mutations go through one mutex. Nothing awaits while it is held:
/// frames are handed to each connection's bounded queue with `try_send`,
/// and the connection's writer task does the actual I/O.
pub struct ConnectionRegistry {
    next_connection_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    frames_sent: AtomicU64,
    frames_skipped: AtomicU64,
    connections_dropped: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_connection_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            frames_sent: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            connections_dropped: AtomicU64::new(0),
        }
    }

    /// Add a new, unauthenticated connection
    ///
    /// `outbound` is the queue drained by the connection's writer task.
    pub fn register(&self, outbound: mpsc::Sender<Frame>) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::SeqCst));

        self.connections.lock().insert(
            id,
            Connection {
                user_id: None,
                outbound,
                connected_at: Utc::now(),
            },
        );

        info!("Registered connection {}", id);
        id
    }

    /// Associate a connection with a user and acknowledge with `auth_success`
    ///
    /// The acknowledgement is queued under the same lock that flips the
    /// connection to authenticated, so it always precedes the first
    /// broadcast the connection is eligible for. Re-authenticating replaces
    /// the previous user.
    pub fn authenticate(&self, id: ConnectionId, user_id: UserId) -> Result<(), RegistryError> {
        let ack = encode(&ServerMessage::AuthSuccess);

        let mut connections = self.connections.lock();
        let connection = connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;

        debug_assert!(connection
            .state()
            .can_transition_to(ConnectionState::Authenticated));

        let previous = connection.user_id.replace(user_id);

        let ack = match ack {
            Ok(ack) => ack,
            Err(e) => {
                error!("Failed to encode auth ack for {}: {}", id, e);
                return Ok(());
            }
        };

        match connection.deliver(&ack) {
            Delivery::Sent => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Full => {
                self.frames_skipped.fetch_add(1, Ordering::Relaxed);
                warn!("Outbound queue full for {}, auth ack dropped", id);
            }
            Delivery::Closed => {
                connections.remove(&id);
                self.connections_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Connection {} closed during auth, removed", id);
                return Err(RegistryError::ConnectionClosed(id));
            }
        }

        match previous {
            Some(prev) if prev != user_id => {
                info!("Connection {} re-authenticated: {} -> {}", id, prev, user_id)
            }
            _ => info!("Connection {} authenticated as {}", id, user_id),
        }

        Ok(())
    }

    /// Remove a connection
    ///
    /// Returns false when the connection was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.lock().remove(&id);

        match removed {
            Some(connection) => {
                debug_assert!(connection.state().can_transition_to(ConnectionState::Closed));
                let open_for = Utc::now() - connection.connected_at;
                info!(
                    "Unregistered connection {} (user: {:?}, open {}s)",
                    id,
                    connection.user_id.map(|u| u.0),
                    open_for.num_seconds()
                );
                true
            }
            None => false,
        }
    }

    /// Send a message to every authenticated connection
    ///
    /// Connections whose queue has closed are dropped from the registry.
    /// Never fails; with no authenticated connections this does nothing.
    pub fn broadcast(&self, message: &ServerMessage) -> BroadcastOutcome {
        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                return BroadcastOutcome::default();
            }
        };

        let outcome = self.fan_out(&frame, |connection| connection.user_id.is_some());
        debug!(
            "Broadcast {}: {} delivered, {} skipped, {} dropped",
            message.kind(),
            outcome.delivered,
            outcome.skipped,
            outcome.dropped
        );
        outcome
    }

    /// Send a message to every connection authenticated as `user_id`
    pub fn send_to_user(&self, user_id: UserId, message: &ServerMessage) -> BroadcastOutcome {
        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                return BroadcastOutcome::default();
            }
        };

        let outcome = self.fan_out(&frame, |connection| connection.user_id == Some(user_id));
        debug!(
            "Sent {} to {}: {} delivered",
            message.kind(),
            user_id,
            outcome.delivered
        );
        outcome
    }

    fn fan_out<F>(&self, frame: &Frame, wants: F) -> BroadcastOutcome
    where
        F: Fn(&Connection) -> bool,
    {
        let mut outcome = BroadcastOutcome::default();
        let mut closed = Vec::new();

        let mut connections = self.connections.lock();
        for (id, connection) in connections.iter().filter(|(_, c)| wants(*c)) {
            match connection.deliver(frame) {
                Delivery::Sent => outcome.delivered += 1,
                Delivery::Full => {
                    outcome.skipped += 1;
                    warn!("Outbound queue full for {}, frame skipped", id);
                }
                Delivery::Closed => closed.push(*id),
            }
        }

        for id in &closed {
            connections.remove(id);
            debug!("Connection {} closed, removed during fan-out", id);
        }
        drop(connections);

        outcome.dropped = closed.len();
        self.frames_sent
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.frames_skipped
            .fetch_add(outcome.skipped as u64, Ordering::Relaxed);
        self.connections_dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);

        outcome
    }

    /// Current lifecycle state of a connection
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections
            .lock()
            .get(&id)
            .map_or(ConnectionState::Closed, Connection::state)
    }

    /// User a connection is authenticated as, if any
    pub fn user_of(&self, id: ConnectionId) -> Option<UserId> {
        self.connections.lock().get(&id).and_then(|c| c.user_id)
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Number of authenticated connections
    pub fn authenticated_count(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|c| c.user_id.is_some())
            .count()
    }

    pub fn stats(&self) -> RegistryStats {
        let connections = self.connections.lock();
        let users: HashSet<UserId> = connections.values().filter_map(|c| c.user_id).collect();

        RegistryStats {
            connections: connections.len(),
            authenticated: connections.values().filter(|c| c.user_id.is_some()).count(),
            users: users.len(),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            connections_dropped: self.connections_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connection_count())
            .field("authenticated", &self.authenticated_count())
            .finish()
    }
}

fn encode(message: &ServerMessage) -> FolioResult<Frame> {
    Ok(Frame::from(serde_json::to_string(message)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{AlertVariant, MarketSnapshot};

    fn connect(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(16);
        (registry.register(tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn market_data() -> ServerMessage {
        ServerMessage::market_data(MarketSnapshot::default())
    }

    #[test]
    fn test_register_starts_unauthenticated() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry);

        assert_eq!(registry.state(id), ConnectionState::Unauthenticated);
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.authenticated_count(), 0);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, _rx_b) = connect(&registry);
        assert_ne!(a, b);
    }

    #[test]
    fn test_auth_success_precedes_market_data() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);

        registry.authenticate(id, UserId(7)).unwrap();
        registry.broadcast(&market_data());

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "auth_success");
        assert_eq!(frames[1]["type"], "market_data");
    }

    #[test]
    fn test_unauthenticated_connections_excluded() {
        let registry = ConnectionRegistry::new();
        let (_id, mut rx) = connect(&registry);

        let outcome = registry.broadcast(&market_data());

        assert_eq!(outcome, BroadcastOutcome::default());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_broadcast_with_no_connections_is_noop() {
        let registry = ConnectionRegistry::new();

        let outcome = registry.broadcast(&market_data());

        assert_eq!(outcome, BroadcastOutcome::default());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn test_same_user_on_two_connections_gets_both() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);
        registry.authenticate(a, UserId(3)).unwrap();
        registry.authenticate(b, UserId(3)).unwrap();

        let outcome = registry.broadcast(&market_data());

        assert_eq!(outcome.delivered, 2);
        assert_eq!(drain(&mut rx_a).len(), 2);
        assert_eq!(drain(&mut rx_b).len(), 2);
        assert_eq!(registry.stats().users, 1);
    }

    #[test]
    fn test_no_delivery_after_unregister() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);
        registry.authenticate(id, UserId(1)).unwrap();
        drain(&mut rx);

        assert!(registry.unregister(id));
        registry.broadcast(&market_data());

        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.state(id), ConnectionState::Closed);
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_closed_connection_dropped_on_broadcast() {
        let registry = ConnectionRegistry::new();
        let (a, rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);
        registry.authenticate(a, UserId(1)).unwrap();
        registry.authenticate(b, UserId(2)).unwrap();
        drop(rx_a);

        let before = registry.connection_count();
        let outcome = registry.broadcast(&market_data());

        assert_eq!(registry.connection_count(), before - 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(registry.state(a), ConnectionState::Closed);
        assert_eq!(drain(&mut rx_b).len(), 2);
    }

    #[test]
    fn test_full_queue_skips_without_dropping() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = registry.register(tx);
        registry.authenticate(id, UserId(1)).unwrap();

        let outcome = registry.broadcast(&market_data());

        assert_eq!(outcome.skipped, 1);
        assert_eq!(registry.state(id), ConnectionState::Authenticated);
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(registry.stats().frames_skipped, 1);
    }

    #[test]
    fn test_reauthenticate_overwrites_user() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);

        registry.authenticate(id, UserId(1)).unwrap();
        registry.authenticate(id, UserId(2)).unwrap();

        assert_eq!(registry.user_of(id), Some(UserId(2)));
        let acks = drain(&mut rx);
        assert_eq!(acks.len(), 2);
        assert!(acks.iter().all(|f| f["type"] == "auth_success"));
    }

    #[test]
    fn test_authenticate_unknown_connection() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            registry.authenticate(ConnectionId(99), UserId(1)),
            Err(RegistryError::UnknownConnection(ConnectionId(99)))
        );
    }

    #[test]
    fn test_authenticate_closed_queue_removes_connection() {
        let registry = ConnectionRegistry::new();
        let (id, rx) = connect(&registry);
        drop(rx);

        assert_eq!(
            registry.authenticate(id, UserId(1)),
            Err(RegistryError::ConnectionClosed(id))
        );
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_send_to_user_targets_only_that_user() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);
        let (_c, mut rx_c) = connect(&registry);
        registry.authenticate(a, UserId(10)).unwrap();
        registry.authenticate(b, UserId(20)).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = registry.send_to_user(
            UserId(10),
            &ServerMessage::alert("Alert", "Threshold hit", AlertVariant::Default),
        );

        assert_eq!(outcome.delivered, 1);
        assert_eq!(drain(&mut rx_a)[0]["type"], "alert");
        assert!(drain(&mut rx_b).is_empty());
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_stats_track_frames() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (_b, _rx_b) = connect(&registry);
        registry.authenticate(a, UserId(5)).unwrap();
        registry.broadcast(&market_data());

        let stats = registry.stats();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.authenticated, 1);
        assert_eq!(stats.users, 1);
        assert_eq!(stats.frames_sent, 2);
    }

    #[test]
    fn test_observed_states_follow_lifecycle() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry);

        let mut observed = vec![registry.state(id)];
        registry.authenticate(id, UserId(1)).unwrap();
        observed.push(registry.state(id));
        registry.authenticate(id, UserId(2)).unwrap();
        observed.push(registry.state(id));
        registry.unregister(id);
        observed.push(registry.state(id));

        assert_eq!(
            observed,
            vec![
                ConnectionState::Unauthenticated,
                ConnectionState::Authenticated,
                ConnectionState::Authenticated,
                ConnectionState::Closed,
            ]
        );
        assert!(observed.windows(2).all(|w| w[0].can_transition_to(w[1])));
    }

    #[test]
    fn test_encode_produces_wire_json() {
        let frame = encode(&ServerMessage::portfolio_update("Growth rebalanced")).unwrap();
        assert_eq!(
            &*frame,
            r#"{"type":"portfolio_update","message":"Growth rebalanced"}"#
        );
    }
}
