//! Market snapshot types
//!
//! A [`MarketSnapshot`] is one sample of market-wide data pushed to every
//! authenticated client. Field names follow the JSON shape the dashboard
//! renders (`indices`, `topMovers`, `sectorPerformance`).

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest level of a market index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuote {
    /// Index level
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    /// Percent change on the session
    #[serde(with = "rust_decimal::serde::float")]
    pub change: Decimal,
}

/// A single entry in the top movers list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopMover {
    pub symbol: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Percent change on the session
    #[serde(with = "rust_decimal::serde::float")]
    pub change: Decimal,
}

/// Percent change of one market sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub change: Decimal,
}

/// One sample of market-wide data
///
/// Snapshots are plain values: each tick builds a new one and nothing is
/// shared between ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// Index name -> quote, in display order
    pub indices: IndexMap<String, IndexQuote>,
    /// Biggest movers, in display order
    pub top_movers: Vec<TopMover>,
    /// Sector performance, in display order
    pub sector_performance: Vec<SectorPerformance>,
}

impl MarketSnapshot {
    /// Create a snapshot from its three parts
    pub fn new(
        indices: IndexMap<String, IndexQuote>,
        top_movers: Vec<TopMover>,
        sector_performance: Vec<SectorPerformance>,
    ) -> Self {
        Self {
            indices,
            top_movers,
            sector_performance,
        }
    }
}
