//! Settlement processor
//!
//! Computes and freezes payout/P&L for every open position in a market
//! once its outcome is resolved. Settlement is idempotent per position:
//! both the polling and the event-driven reconciliation path may observe
//! the same resolution, so an already-closed position is always skipped.

use crate::ledger;
use crate::store::{MarketStore, PositionStatus, StoreError};
use crate::telemetry::{self, CounterMetric};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one settlement pass over a market
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    /// Positions closed by this pass
    pub settled: usize,
    /// Positions already closed by an earlier pass
    pub skipped: usize,
    /// Total payout credited
    pub total_payout: Decimal,
}

/// Applies resolved outcomes to open positions
pub struct SettlementProcessor<S> {
    store: Arc<S>,
}

impl<S: MarketStore> SettlementProcessor<S> {
    /// Create a new settlement processor
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Settle every open position in a market against the resolved outcome.
    ///
    /// A winning position pays out its share count; a losing one pays zero.
    /// Realized P&L is payout minus total cost and is frozen at closure.
    /// Calling this twice for the same market yields identical final
    /// position states.
    pub async fn settle(
        &self,
        market_id: Uuid,
        outcome_index: u8,
    ) -> Result<SettlementReport, StoreError> {
        let positions = self.store.open_positions(market_id).await;
        let mut report = SettlementReport::default();

        for position in positions {
            let winning = ledger::outcome_index(&position.outcome) == Some(outcome_index);

            // The status check runs inside the record lock: a racing pass
            // that already closed this position makes ours a no-op.
            let closed = self
                .store
                .update_position(position.id, move |p| {
                    if p.status == PositionStatus::Closed {
                        return None;
                    }
                    let payout = if winning { p.shares } else { Decimal::ZERO };
                    p.realized_pnl = payout - p.total_cost;
                    p.unrealized_pnl = Decimal::ZERO;
                    p.status = PositionStatus::Closed;
                    Some((p.user.clone(), p.realized_pnl, payout))
                })
                .await?;

            match closed {
                Some((user, realized_pnl, payout)) => {
                    self.store.credit_user_pnl(&user, realized_pnl).await;
                    report.settled += 1;
                    report.total_payout += payout;

                    tracing::info!(
                        %market_id,
                        position_id = %position.id,
                        user = %user,
                        winning,
                        %payout,
                        %realized_pnl,
                        "Position settled"
                    );
                }
                None => {
                    report.skipped += 1;
                    tracing::debug!(
                        %market_id,
                        position_id = %position.id,
                        "Position already closed, skipping"
                    );
                }
            }
        }

        telemetry::increment(CounterMetric::PositionsSettled, report.settled as u64);

        tracing::info!(
            %market_id,
            outcome_index,
            settled = report.settled,
            skipped = report.skipped,
            total_payout = %report.total_payout,
            "Settlement pass complete"
        );

        Ok(report)
    }
}
