//! WebSocket message types for the real-time channel
//!
//! These types define the JSON protocol between the server and browser
//! clients. Every frame is an object discriminated by its `type` field.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::MarketSnapshot;

/// Identity a client claims in its auth message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Associate the connection with a user
    Auth {
        /// Absent or null leaves the connection unauthenticated
        #[serde(rename = "userId", default)]
        user_id: Option<UserId>,
    },
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Auth message accepted
    AuthSuccess,
    /// Periodic market snapshot
    MarketData {
        data: MarketSnapshot,
        #[serde(serialize_with = "serialize_iso_millis")]
        timestamp: DateTime<Utc>,
    },
    /// A portfolio owned by the user changed
    PortfolioUpdate { message: String },
    /// Free-form alert shown as a toast
    Alert {
        title: String,
        message: String,
        variant: AlertVariant,
    },
}

impl ServerMessage {
    /// Wrap a snapshot stamped with the current time
    pub fn market_data(data: MarketSnapshot) -> Self {
        Self::MarketData {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn portfolio_update(message: impl Into<String>) -> Self {
        Self::PortfolioUpdate {
            message: message.into(),
        }
    }

    pub fn alert(title: impl Into<String>, message: impl Into<String>, variant: AlertVariant) -> Self {
        Self::Alert {
            title: title.into(),
            message: message.into(),
            variant,
        }
    }

    /// Wire value of the `type` discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth_success",
            Self::MarketData { .. } => "market_data",
            Self::PortfolioUpdate { .. } => "portfolio_update",
            Self::Alert { .. } => "alert",
        }
    }
}

/// Severity of an alert, rendered as the toast variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertVariant {
    #[default]
    Default,
    Destructive,
}

/// ISO-8601 with millisecond precision and a `Z` suffix
fn serialize_iso_millis<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// ============================================================================
// Connection lifecycle
// ============================================================================

/// Lifecycle of a registered client connection
///
/// `Unauthenticated -> Authenticated -> Closed`. The upgrade handshake runs
/// before registration, so it has no state here. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Open, no auth message accepted yet
    Unauthenticated,
    /// Open and associated with a user
    Authenticated,
    /// Removed from the registry
    Closed,
}

impl ConnectionState {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (*self, next) {
            (Unauthenticated, Authenticated) => true,
            // re-auth overwrites the user association
            (Authenticated, Authenticated) => true,
            (Unauthenticated | Authenticated, Closed) => true,
            _ => false,
        }
    }
}
