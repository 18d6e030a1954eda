//! Ledger client facade
//!
//! Read/write access to the on-chain prediction-market contract. Everything
//! here traverses a remote node and must be assumed to fail transiently;
//! callers retry on their next scheduled tick, never in a tight loop.

mod events;
mod node;

pub use events::{EventSubscriber, SubscriberConfig};
pub use node::{NodeConfig, NodeLedgerClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Resolution outcome ordering as declared by the market contract.
///
/// Index 0 is "yes", index 1 is "no". This is the single place the mapping
/// is defined; the decision engine, the settlement processor and the tests
/// all go through `outcome_index`/`outcome_label`. The contract enum must
/// not be reordered.
pub const OUTCOME_YES: u8 = 0;
/// See [`OUTCOME_YES`].
pub const OUTCOME_NO: u8 = 1;

/// Map an outcome label to the contract's outcome index
pub fn outcome_index(label: &str) -> Option<u8> {
    match label.to_ascii_lowercase().as_str() {
        "yes" => Some(OUTCOME_YES),
        "no" => Some(OUTCOME_NO),
        _ => None,
    }
}

/// Map a contract outcome index back to its label
pub fn outcome_label(index: u8) -> Option<&'static str> {
    match index {
        OUTCOME_YES => Some("yes"),
        OUTCOME_NO => Some("no"),
        _ => None,
    }
}

/// Ledger interaction errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Node RPC failure (network, 5xx, timeout)
    #[error("Node RPC error: {0}")]
    Rpc(String),
    /// Transaction rejected by the contract (e.g. already resolved)
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    /// Transaction not confirmed within the allowed window
    #[error("Confirmation timed out for tx {0}")]
    ConfirmationTimeout(String),
    /// Node returned something we cannot interpret
    #[error("Invalid node response: {0}")]
    InvalidResponse(String),
}

/// Market status as stored by the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Active,
    Closed,
    Resolved,
    Invalid,
}

impl TryFrom<u8> for ChainStatus {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChainStatus::Active),
            1 => Ok(ChainStatus::Closed),
            2 => Ok(ChainStatus::Resolved),
            3 => Ok(ChainStatus::Invalid),
            other => Err(LedgerError::InvalidResponse(format!(
                "unknown status discriminant {}",
                other
            ))),
        }
    }
}

/// On-chain market state as read from the contract
#[derive(Debug, Clone)]
pub struct ChainMarket {
    /// Contract-side market id
    pub chain_id: u64,
    /// Lifecycle status on chain
    pub status: ChainStatus,
    /// Winning outcome index, present once resolved
    pub resolved_outcome: Option<u8>,
    /// Trading cutoff recorded on chain
    pub end_time: DateTime<Utc>,
    /// Market question, when the node exposes it
    pub question: Option<String>,
    /// Outcome labels in contract order, when the node exposes them
    pub outcomes: Option<Vec<String>>,
}

/// Handle for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle(pub String);

/// Confirmation receipt
#[derive(Debug, Clone)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block the transaction landed in
    pub block_number: u64,
}

/// Push event emitted by the contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A market creation transaction was observed
    MarketCreated {
        chain_id: u64,
        question: String,
        outcomes: Vec<String>,
        end_time: DateTime<Utc>,
    },
    /// Trading closed
    MarketClosed { chain_id: u64 },
    /// Outcome resolved
    MarketResolved { chain_id: u64, outcome: u8 },
}

impl LedgerEvent {
    /// Contract-side market id this event refers to
    pub fn chain_id(&self) -> u64 {
        match self {
            LedgerEvent::MarketCreated { chain_id, .. } => *chain_id,
            LedgerEvent::MarketClosed { chain_id } => *chain_id,
            LedgerEvent::MarketResolved { chain_id, .. } => *chain_id,
        }
    }
}

/// Trait for ledger client implementations
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Read the on-chain struct for one market
    async fn read_market(&self, chain_id: u64) -> Result<ChainMarket, LedgerError>;
    /// Number of markets the contract has created
    async fn market_count(&self) -> Result<u64, LedgerError>;
    /// Submit a close transaction
    async fn submit_close(&self, chain_id: u64) -> Result<TxHandle, LedgerError>;
    /// Submit a resolve transaction
    async fn submit_resolve(&self, chain_id: u64, outcome_index: u8)
        -> Result<TxHandle, LedgerError>;
    /// Wait for a transaction to confirm, bounded by `timeout`
    async fn wait_for_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<TxReceipt, LedgerError>;
}
