//! Local read-model for markets and positions
//!
//! Holds the off-chain view of ledger state. The ledger is authoritative;
//! this store only ever converges toward it. Per-record updates go through
//! locked read-modify-write so concurrent sweeps cannot lose writes.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("Record not found: {0}")]
    NotFound(Uuid),
    /// No market anchored to this chain id
    #[error("Unknown chain id: {0}")]
    UnknownChainId(u64),
    /// Chain id already anchored to another market
    #[error("Chain id {0} already in use")]
    ChainIdConflict(u64),
}

/// Market lifecycle status.
///
/// Transitions are monotonic: Active → Closed → {Resolved, Invalid}.
/// Resolved and Invalid are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Closed,
    Resolved,
    Invalid,
}

impl MarketStatus {
    /// Position of this status in the lifecycle lattice
    fn rank(self) -> u8 {
        match self {
            MarketStatus::Active => 0,
            MarketStatus::Closed => 1,
            MarketStatus::Resolved => 2,
            MarketStatus::Invalid => 2,
        }
    }

    /// Whether this status ends the market lifecycle
    pub fn is_terminal(self) -> bool {
        matches!(self, MarketStatus::Resolved | MarketStatus::Invalid)
    }

    /// Whether a transition to `next` moves forward in the lattice.
    ///
    /// Equal-rank transitions are rejected, so a Resolved market can never
    /// flip to Invalid or vice versa.
    pub fn can_advance_to(self, next: MarketStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketStatus::Active => write!(f, "active"),
            MarketStatus::Closed => write!(f, "closed"),
            MarketStatus::Resolved => write!(f, "resolved"),
            MarketStatus::Invalid => write!(f, "invalid"),
        }
    }
}

/// A prediction market in the local read-model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Stable local identifier
    pub id: Uuid,
    /// Sequential id assigned by the ledger contract; None until the
    /// creation transaction has been observed. Immutable once set.
    pub chain_id: Option<u64>,
    /// Market question
    pub question: String,
    /// Longer description shown to the decision service
    pub description: String,
    /// Category label
    pub category: String,
    /// Outcome labels, in contract order
    pub outcomes: Vec<String>,
    /// Trading cutoff
    pub closing_time: DateTime<Utc>,
    /// Lifecycle status
    pub status: MarketStatus,
    /// Winning outcome index; set iff status is Resolved
    pub resolved_outcome: Option<u8>,
    /// When the resolution was observed or authored
    pub resolution_time: Option<DateTime<Utc>>,
}

impl Market {
    /// Create a new active market
    pub fn new(
        question: impl Into<String>,
        category: impl Into<String>,
        outcomes: Vec<String>,
        closing_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain_id: None,
            question: question.into(),
            description: String::new(),
            category: category.into(),
            outcomes,
            closing_time,
            status: MarketStatus::Active,
            resolved_outcome: None,
            resolution_time: None,
        }
    }

    /// Whether this market is awaiting automated resolution.
    ///
    /// Closed markets without an outcome stay eligible so a failed
    /// decision attempt is retried on a later sweep.
    pub fn needs_resolution(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            MarketStatus::Active => self.closing_time <= now,
            MarketStatus::Closed => true,
            MarketStatus::Resolved | MarketStatus::Invalid => false,
        }
    }
}

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A user's holding in one market outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier
    pub id: Uuid,
    /// Owning market
    pub market_id: Uuid,
    /// Owning user
    pub user: String,
    /// Outcome label held (e.g. "yes")
    pub outcome: String,
    /// Shares held
    pub shares: Decimal,
    /// Size-weighted average entry price
    pub average_price: Decimal,
    /// Total amount paid
    pub total_cost: Decimal,
    /// Mark-to-market P&L while open
    pub unrealized_pnl: Decimal,
    /// P&L frozen at closure
    pub realized_pnl: Decimal,
    /// Open or closed
    pub status: PositionStatus,
}

impl Position {
    /// Open a new position from a first trade
    pub fn open(
        market_id: Uuid,
        user: impl Into<String>,
        outcome: impl Into<String>,
        shares: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            market_id,
            user: user.into(),
            outcome: outcome.into(),
            shares,
            average_price: price,
            total_cost: shares * price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
        }
    }

    /// Fold a subsequent trade into the position, maintaining the
    /// size-weighted average price.
    pub fn apply_trade(&mut self, shares: Decimal, price: Decimal) {
        let cost = shares * price;
        self.shares += shares;
        self.total_cost += cost;
        if !self.shares.is_zero() {
            self.average_price = self.total_cost / self.shares;
        }
    }
}

/// Read-model storage interface.
///
/// `update_market` / `update_position` are atomic per-record
/// read-modify-write operations; callers must not change record identity
/// (id, chain_id) inside the closure — anchoring goes through
/// `anchor_market` so the chain-id index stays consistent.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert a new market
    async fn insert_market(&self, market: Market) -> Result<(), StoreError>;

    /// Fetch a market by local id
    async fn market(&self, id: Uuid) -> Result<Market, StoreError>;

    /// Fetch a market by its on-chain id
    async fn market_by_chain_id(&self, chain_id: u64) -> Result<Market, StoreError>;

    /// All markets with the given status
    async fn markets_by_status(&self, status: MarketStatus) -> Vec<Market>;

    /// All markets not yet in a terminal status
    async fn non_terminal_markets(&self) -> Vec<Market>;

    /// Bind a market to its on-chain id. Fails if the market is already
    /// anchored to a different id or the id belongs to another market.
    async fn anchor_market(&self, id: Uuid, chain_id: u64) -> Result<(), StoreError>;

    /// Atomically mutate one market record
    async fn update_market<F, T>(&self, id: Uuid, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Market) -> T + Send,
        T: Send;

    /// Record a trade, opening a position on first touch and folding into
    /// the weighted average on subsequent trades.
    async fn record_trade(
        &self,
        market_id: Uuid,
        user: &str,
        outcome: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<Position, StoreError>;

    /// Fetch a position by id
    async fn position(&self, id: Uuid) -> Result<Position, StoreError>;

    /// All open positions in a market
    async fn open_positions(&self, market_id: Uuid) -> Vec<Position>;

    /// Atomically mutate one position record
    async fn update_position<F, T>(&self, id: Uuid, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Position) -> T + Send,
        T: Send;

    /// Add to a user's aggregate realized P&L
    async fn credit_user_pnl(&self, user: &str, delta: Decimal);

    /// A user's aggregate realized P&L
    async fn user_pnl(&self, user: &str) -> Decimal;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_lattice_forward() {
        assert!(MarketStatus::Active.can_advance_to(MarketStatus::Closed));
        assert!(MarketStatus::Active.can_advance_to(MarketStatus::Resolved));
        assert!(MarketStatus::Closed.can_advance_to(MarketStatus::Resolved));
        assert!(MarketStatus::Closed.can_advance_to(MarketStatus::Invalid));
    }

    #[test]
    fn test_status_lattice_never_backward() {
        assert!(!MarketStatus::Closed.can_advance_to(MarketStatus::Active));
        assert!(!MarketStatus::Resolved.can_advance_to(MarketStatus::Closed));
        assert!(!MarketStatus::Resolved.can_advance_to(MarketStatus::Active));
        assert!(!MarketStatus::Invalid.can_advance_to(MarketStatus::Resolved));
        assert!(!MarketStatus::Resolved.can_advance_to(MarketStatus::Invalid));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!MarketStatus::Active.is_terminal());
        assert!(!MarketStatus::Closed.is_terminal());
        assert!(MarketStatus::Resolved.is_terminal());
        assert!(MarketStatus::Invalid.is_terminal());
    }

    #[test]
    fn test_status_no_self_transition() {
        assert!(!MarketStatus::Closed.can_advance_to(MarketStatus::Closed));
    }

    #[test]
    fn test_market_needs_resolution_through_lifecycle() {
        let mut market = Market::new(
            "Will it rain tomorrow?",
            "weather",
            vec!["yes".to_string(), "no".to_string()],
            Utc::now() - chrono::Duration::hours(1),
        );
        assert!(market.needs_resolution(Utc::now()));

        // Closed without an outcome is still awaiting resolution
        market.status = MarketStatus::Closed;
        assert!(market.needs_resolution(Utc::now()));

        market.status = MarketStatus::Resolved;
        assert!(!market.needs_resolution(Utc::now()));
        market.status = MarketStatus::Invalid;
        assert!(!market.needs_resolution(Utc::now()));
    }

    #[test]
    fn test_market_needs_resolution_before_cutoff() {
        let market = Market::new(
            "Will it rain tomorrow?",
            "weather",
            vec!["yes".to_string(), "no".to_string()],
            Utc::now() + chrono::Duration::hours(1),
        );
        assert!(!market.needs_resolution(Utc::now()));
    }

    #[test]
    fn test_position_open() {
        let position = Position::open(Uuid::new_v4(), "alice", "yes", dec!(40), dec!(0.5));
        assert_eq!(position.shares, dec!(40));
        assert_eq!(position.average_price, dec!(0.5));
        assert_eq!(position.total_cost, dec!(20));
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.realized_pnl, dec!(0));
    }

    #[test]
    fn test_position_weighted_average() {
        let mut position = Position::open(Uuid::new_v4(), "alice", "yes", dec!(100), dec!(0.40));
        position.apply_trade(dec!(100), dec!(0.60));

        assert_eq!(position.shares, dec!(200));
        assert_eq!(position.total_cost, dec!(100)); // 40 + 60
        assert_eq!(position.average_price, dec!(0.5));
    }

    #[test]
    fn test_position_weighted_average_uneven() {
        let mut position = Position::open(Uuid::new_v4(), "bob", "no", dec!(30), dec!(0.20));
        position.apply_trade(dec!(10), dec!(0.60));

        assert_eq!(position.shares, dec!(40));
        assert_eq!(position.total_cost, dec!(12)); // 6 + 6
        assert_eq!(position.average_price, dec!(0.3));
    }
}
