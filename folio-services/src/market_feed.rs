//! Market data sources
//!
//! The broadcaster pulls one [`MarketSnapshot`] per tick from a
//! [`MarketDataSource`]. [`SimulatedMarketFeed`] generates plausible data
//! around fixed baselines; a live provider plugs in behind the same trait.

use async_trait::async_trait;
use folio_core::{FolioResult, IndexQuote, MarketSnapshot, SectorPerformance, TopMover};
use indexmap::IndexMap;
use rand::Rng;
use rust_decimal::Decimal;

/// Anything that can produce a market snapshot on demand
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Produce a fresh snapshot
    async fn snapshot(&self) -> FolioResult<MarketSnapshot>;
}

/// Percent moves in basis points of a percent (hundredths)
const INDEX_MOVE_RANGE: i64 = 250;
const MOVER_MOVE_RANGE: i64 = 800;
const SECTOR_MOVE_RANGE: i64 = 300;

/// Number of entries in the top movers list
pub const DEFAULT_TOP_MOVERS: usize = 5;

const INDICES: &[(&str, i64)] = &[
    ("S&P 500", 478_345),
    ("NASDAQ", 1_501_135),
    ("Dow Jones", 3_754_533),
    ("Russell 2000", 202_707),
];

const STOCKS: &[(&str, &str, i64)] = &[
    ("AAPL", "Apple Inc.", 19_264),
    ("MSFT", "Microsoft Corp.", 37_614),
    ("NVDA", "NVIDIA Corp.", 49_522),
    ("AMZN", "Amazon.com Inc.", 15_187),
    ("GOOGL", "Alphabet Inc.", 13_997),
    ("META", "Meta Platforms Inc.", 35_325),
    ("TSLA", "Tesla Inc.", 24_848),
    ("JPM", "JPMorgan Chase & Co.", 17_010),
    ("AMD", "Advanced Micro Devices", 14_741),
    ("NFLX", "Netflix Inc.", 48_688),
];

const SECTORS: &[&str] = &[
    "Technology",
    "Healthcare",
    "Financials",
    "Energy",
    "Consumer Discretionary",
    "Industrials",
    "Utilities",
    "Real Estate",
];

/// Random-walk market generator
///
/// Every call draws fresh moves from the fixed baselines; nothing carries
/// over between snapshots.
#[derive(Debug, Clone)]
pub struct SimulatedMarketFeed {
    top_movers: usize,
}

impl SimulatedMarketFeed {
    pub fn new() -> Self {
        Self {
            top_movers: DEFAULT_TOP_MOVERS,
        }
    }

    /// Limit the number of top movers per snapshot
    pub fn with_top_movers(mut self, count: usize) -> Self {
        self.top_movers = count.min(STOCKS.len());
        self
    }

    /// Generate a snapshot from the given random source
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> MarketSnapshot {
        let indices: IndexMap<String, IndexQuote> = INDICES
            .iter()
            .map(|&(name, base)| {
                let change = percent_move(&mut *rng, INDEX_MOVE_RANGE);
                let quote = IndexQuote {
                    value: apply_move(Decimal::new(base, 2), change),
                    change,
                };
                (name.to_string(), quote)
            })
            .collect();

        let mut movers: Vec<TopMover> = STOCKS
            .iter()
            .map(|&(symbol, name, base)| {
                let change = percent_move(&mut *rng, MOVER_MOVE_RANGE);
                TopMover {
                    symbol: symbol.to_string(),
                    name: name.to_string(),
                    price: apply_move(Decimal::new(base, 2), change),
                    change,
                }
            })
            .collect();
        movers.sort_by(|a, b| b.change.abs().cmp(&a.change.abs()));
        movers.truncate(self.top_movers);

        let mut sectors: Vec<SectorPerformance> = SECTORS
            .iter()
            .map(|&name| SectorPerformance {
                name: name.to_string(),
                change: percent_move(&mut *rng, SECTOR_MOVE_RANGE),
            })
            .collect();
        sectors.sort_by(|a, b| b.change.cmp(&a.change));

        MarketSnapshot::new(indices, movers, sectors)
    }
}

impl Default for SimulatedMarketFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarketFeed {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn snapshot(&self) -> FolioResult<MarketSnapshot> {
        Ok(self.generate(&mut rand::rng()))
    }
}

/// Uniform percent move in `[-range, range]` hundredths of a percent
fn percent_move<R: Rng + ?Sized>(rng: &mut R, range: i64) -> Decimal {
    Decimal::new(rng.random_range(-range..=range), 2)
}

fn apply_move(base: Decimal, change: Decimal) -> Decimal {
    (base * (Decimal::ONE + change / Decimal::ONE_HUNDRED)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    #[test]
    fn test_generate_has_all_parts() {
        let feed = SimulatedMarketFeed::new();
        let snapshot = feed.generate(&mut StdRng::seed_from_u64(42));

        assert_eq!(snapshot.indices.len(), INDICES.len());
        assert_eq!(snapshot.top_movers.len(), DEFAULT_TOP_MOVERS);
        assert_eq!(snapshot.sector_performance.len(), SECTORS.len());
        assert!(snapshot.indices.contains_key("S&P 500"));
    }

    #[test]
    fn test_moves_within_bounds() {
        let feed = SimulatedMarketFeed::new();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let snapshot = feed.generate(&mut rng);
            for quote in snapshot.indices.values() {
                assert!(quote.change.abs() <= dec!(2.50));
                assert!(quote.value > Decimal::ZERO);
            }
            for mover in &snapshot.top_movers {
                assert!(mover.change.abs() <= dec!(8.00));
                assert!(mover.price > Decimal::ZERO);
            }
            for sector in &snapshot.sector_performance {
                assert!(sector.change.abs() <= dec!(3.00));
            }
        }
    }

    #[test]
    fn test_movers_sorted_by_magnitude() {
        let snapshot = SimulatedMarketFeed::new().generate(&mut StdRng::seed_from_u64(1));
        let magnitudes: Vec<Decimal> = snapshot.top_movers.iter().map(|m| m.change.abs()).collect();
        assert!(magnitudes.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_sectors_sorted_best_first() {
        let snapshot = SimulatedMarketFeed::new().generate(&mut StdRng::seed_from_u64(3));
        assert!(snapshot
            .sector_performance
            .windows(2)
            .all(|w| w[0].change >= w[1].change));
    }

    #[test]
    fn test_top_mover_limit_clamped() {
        let feed = SimulatedMarketFeed::new().with_top_movers(100);
        let snapshot = feed.generate(&mut StdRng::seed_from_u64(9));
        assert_eq!(snapshot.top_movers.len(), STOCKS.len());
    }

    #[test]
    fn test_apply_move() {
        assert_eq!(apply_move(dec!(100.00), dec!(1.50)), dec!(101.50));
        assert_eq!(apply_move(dec!(200.00), dec!(-2.25)), dec!(195.50));
    }

    #[tokio::test]
    async fn test_consecutive_snapshots_are_independent() {
        let feed = SimulatedMarketFeed::new();
        let mut first = feed.snapshot().await.unwrap();
        let second = feed.snapshot().await.unwrap();
        let second_copy = second.clone();

        first.top_movers.clear();
        first.indices.clear();

        assert_eq!(second, second_copy);
        assert!(!second.indices.is_empty());
    }
}
