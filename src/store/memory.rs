//! In-memory store implementation
//!
//! Records live behind individual locks so that the reconciler and the
//! settlement processor can mutate disjoint records concurrently without
//! lost updates. The outer maps are only locked long enough to find or
//! insert a record handle.

use super::{Market, MarketStatus, MarketStore, Position, PositionStatus, StoreError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type Record<T> = Arc<RwLock<T>>;

/// In-process read-model store with per-record locking
#[derive(Default)]
pub struct MemoryStore {
    markets: RwLock<HashMap<Uuid, Record<Market>>>,
    chain_index: RwLock<HashMap<u64, Uuid>>,
    positions: RwLock<HashMap<Uuid, Record<Position>>>,
    user_pnl: RwLock<HashMap<String, Decimal>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn market_record(&self, id: Uuid) -> Result<Record<Market>, StoreError> {
        let markets = self.markets.read().await;
        markets.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn position_record(&self, id: Uuid) -> Result<Record<Position>, StoreError> {
        let positions = self.positions.read().await;
        positions.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn insert_market(&self, market: Market) -> Result<(), StoreError> {
        if let Some(chain_id) = market.chain_id {
            let mut index = self.chain_index.write().await;
            if index.contains_key(&chain_id) {
                return Err(StoreError::ChainIdConflict(chain_id));
            }
            index.insert(chain_id, market.id);
        }

        let mut markets = self.markets.write().await;
        markets.insert(market.id, Arc::new(RwLock::new(market)));
        Ok(())
    }

    async fn market(&self, id: Uuid) -> Result<Market, StoreError> {
        let record = self.market_record(id).await?;
        let market = record.read().await;
        Ok(market.clone())
    }

    async fn market_by_chain_id(&self, chain_id: u64) -> Result<Market, StoreError> {
        let id = {
            let index = self.chain_index.read().await;
            index
                .get(&chain_id)
                .copied()
                .ok_or(StoreError::UnknownChainId(chain_id))?
        };
        self.market(id).await
    }

    async fn markets_by_status(&self, status: MarketStatus) -> Vec<Market> {
        let records: Vec<Record<Market>> = {
            let markets = self.markets.read().await;
            markets.values().cloned().collect()
        };

        let mut result = Vec::new();
        for record in records {
            let market = record.read().await;
            if market.status == status {
                result.push(market.clone());
            }
        }
        result
    }

    async fn non_terminal_markets(&self) -> Vec<Market> {
        let records: Vec<Record<Market>> = {
            let markets = self.markets.read().await;
            markets.values().cloned().collect()
        };

        let mut result = Vec::new();
        for record in records {
            let market = record.read().await;
            if !market.status.is_terminal() {
                result.push(market.clone());
            }
        }
        result
    }

    async fn anchor_market(&self, id: Uuid, chain_id: u64) -> Result<(), StoreError> {
        let record = self.market_record(id).await?;

        let mut index = self.chain_index.write().await;
        let mut market = record.write().await;

        match market.chain_id {
            Some(existing) if existing == chain_id => Ok(()),
            Some(_) => Err(StoreError::ChainIdConflict(chain_id)),
            None => {
                if index.contains_key(&chain_id) {
                    return Err(StoreError::ChainIdConflict(chain_id));
                }
                market.chain_id = Some(chain_id);
                index.insert(chain_id, id);
                Ok(())
            }
        }
    }

    async fn update_market<F, T>(&self, id: Uuid, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Market) -> T + Send,
        T: Send,
    {
        let record = self.market_record(id).await?;
        let mut market = record.write().await;
        Ok(f(&mut market))
    }

    async fn record_trade(
        &self,
        market_id: Uuid,
        user: &str,
        outcome: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<Position, StoreError> {
        // Fold into an existing open position for the same holding if any
        let records: Vec<Record<Position>> = {
            let positions = self.positions.read().await;
            positions.values().cloned().collect()
        };
        let mut existing = None;
        for record in records {
            let position = record.read().await;
            if position.market_id == market_id
                && position.user == user
                && position.outcome == outcome
                && position.status == PositionStatus::Open
            {
                drop(position);
                existing = Some(record);
                break;
            }
        }

        if let Some(record) = existing {
            let mut position = record.write().await;
            position.apply_trade(shares, price);
            return Ok(position.clone());
        }

        let position = Position::open(market_id, user, outcome, shares, price);
        let mut positions = self.positions.write().await;
        positions.insert(position.id, Arc::new(RwLock::new(position.clone())));
        Ok(position)
    }

    async fn position(&self, id: Uuid) -> Result<Position, StoreError> {
        let record = self.position_record(id).await?;
        let position = record.read().await;
        Ok(position.clone())
    }

    async fn open_positions(&self, market_id: Uuid) -> Vec<Position> {
        let records: Vec<Record<Position>> = {
            let positions = self.positions.read().await;
            positions.values().cloned().collect()
        };

        let mut result = Vec::new();
        for record in records {
            let position = record.read().await;
            if position.market_id == market_id && position.status == PositionStatus::Open {
                result.push(position.clone());
            }
        }
        result
    }

    async fn update_position<F, T>(&self, id: Uuid, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Position) -> T + Send,
        T: Send,
    {
        let record = self.position_record(id).await?;
        let mut position = record.write().await;
        Ok(f(&mut position))
    }

    async fn credit_user_pnl(&self, user: &str, delta: Decimal) {
        let mut pnl = self.user_pnl.write().await;
        *pnl.entry(user.to_string()).or_insert(Decimal::ZERO) += delta;
    }

    async fn user_pnl(&self, user: &str) -> Decimal {
        let pnl = self.user_pnl.read().await;
        pnl.get(user).copied().unwrap_or(Decimal::ZERO)
    }
}
