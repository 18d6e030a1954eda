//! Reconciler
//!
//! One-directional sync from the ledger into the local store: chain truth
//! always wins, and local status only ever moves forward through the
//! lifecycle lattice. Runs as a polling sweep (`sync_all`) and as an event
//! consumer (`watch`); both paths funnel through the same merge so any
//! interleaving converges to the same state.

use crate::ledger::{ChainStatus, LedgerClient, LedgerError, LedgerEvent};
use crate::settlement::SettlementProcessor;
use crate::store::{Market, MarketStatus, MarketStore};
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Aggregate result of one reconciliation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Markets examined
    pub examined: usize,
    /// Markets whose status advanced
    pub advanced: usize,
    /// Markets settled by this sweep
    pub settled: usize,
    /// Per-market failures (logged, never fatal to the sweep)
    pub failed: usize,
}

/// What a merge did to the local record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    /// Local record already at or past the observed status
    NoChange,
    /// Status advanced
    Advanced,
    /// Status advanced into Resolved; settlement is owed exactly once
    FreshlyResolved(u8),
}

/// Merges authoritative ledger state into the local store
pub struct Reconciler<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    settlement: Arc<SettlementProcessor<S>>,
}

impl<S, L> Reconciler<S, L>
where
    S: MarketStore,
    L: LedgerClient,
{
    /// Create a new reconciler
    pub fn new(store: Arc<S>, ledger: Arc<L>, settlement: Arc<SettlementProcessor<S>>) -> Self {
        Self {
            store,
            ledger,
            settlement,
        }
    }

    /// Sync one market from chain truth.
    ///
    /// Markets not yet anchored to a chain id are skipped; they become
    /// syncable once their creation transaction is observed.
    pub async fn sync(&self, market: &Market) -> anyhow::Result<()> {
        let Some(chain_id) = market.chain_id else {
            tracing::debug!(market_id = %market.id, "Market not anchored yet, skipping sync");
            return Ok(());
        };

        let chain = self.ledger.read_market(chain_id).await?;
        self.merge(market.id, chain.status, chain.resolved_outcome)
            .await?;
        Ok(())
    }

    /// Rebuild the read-model from ledger truth.
    ///
    /// The store is process-local, so on startup every market the contract
    /// knows about is read back and inserted at its current chain status.
    /// Contract market ids are sequential starting at 1.
    pub async fn bootstrap(&self) -> anyhow::Result<usize> {
        let count = self.ledger.market_count().await?;
        let mut inserted = 0;

        for chain_id in 1..=count {
            if self.store.market_by_chain_id(chain_id).await.is_ok() {
                continue;
            }

            match self.ledger.read_market(chain_id).await {
                Ok(chain) => {
                    let mut market = Market::new(
                        chain
                            .question
                            .clone()
                            .unwrap_or_else(|| format!("market #{}", chain_id)),
                        "",
                        chain
                            .outcomes
                            .clone()
                            .unwrap_or_else(|| vec!["yes".to_string(), "no".to_string()]),
                        chain.end_time,
                    );
                    market.chain_id = Some(chain_id);
                    self.store.insert_market(market).await?;
                    inserted += 1;

                    // Adopt the current chain status through the normal merge
                    if let Ok(local) = self.store.market_by_chain_id(chain_id).await {
                        if let Err(e) = self
                            .merge(local.id, chain.status, chain.resolved_outcome)
                            .await
                        {
                            tracing::warn!(chain_id, error = %e, "Bootstrap merge failed, will retry next sweep");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(chain_id, error = %e, "Bootstrap read failed, skipping");
                }
            }
        }

        tracing::info!(count, inserted, "Bootstrap complete");
        Ok(inserted)
    }

    /// Sweep every non-terminal market, tolerating per-item failure.
    ///
    /// One bad market cannot block any other; failures are logged and
    /// retried naturally on the next tick.
    pub async fn sync_all(&self) -> SweepReport {
        let markets = self.store.non_terminal_markets().await;
        let mut report = SweepReport {
            examined: markets.len(),
            ..Default::default()
        };

        for market in &markets {
            let Some(chain_id) = market.chain_id else {
                continue;
            };

            match self.ledger.read_market(chain_id).await {
                Ok(chain) => {
                    match self
                        .merge(market.id, chain.status, chain.resolved_outcome)
                        .await
                    {
                        Ok(Merge::NoChange) => {}
                        Ok(Merge::Advanced) => report.advanced += 1,
                        Ok(Merge::FreshlyResolved(_)) => {
                            report.advanced += 1;
                            report.settled += 1;
                        }
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(market_id = %market.id, error = %e, "Merge failed");
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(chain_id, error = %e, "Chain read failed, will retry next sweep");
                }
            }
        }

        telemetry::increment(CounterMetric::ReconcileSweeps, 1);
        telemetry::increment(CounterMetric::MarketsSynced, report.advanced as u64);
        telemetry::increment(CounterMetric::SyncFailures, report.failed as u64);
        telemetry::set_gauge(GaugeMetric::OpenMarkets, report.examined as f64);

        tracing::info!(
            examined = report.examined,
            advanced = report.advanced,
            settled = report.settled,
            failed = report.failed,
            "Reconciliation sweep complete"
        );

        report
    }

    /// Consume ledger events, applying the same merge keyed by chain id.
    ///
    /// Runs until the event channel closes. Creation events insert new
    /// markets; close/resolve events for unknown chain ids are skipped
    /// (the polling sweep converges them once the market is known).
    pub async fn watch(&self, mut rx: mpsc::Receiver<LedgerEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.apply_event(&event).await {
                tracing::warn!(chain_id = event.chain_id(), error = %e, "Failed to apply event");
            } else {
                telemetry::increment(CounterMetric::EventsApplied, 1);
            }
        }
        tracing::info!("Event channel closed, watch loop exiting");
    }

    /// Apply a single ledger event
    pub async fn apply_event(&self, event: &LedgerEvent) -> anyhow::Result<()> {
        match event {
            LedgerEvent::MarketCreated {
                chain_id,
                question,
                outcomes,
                end_time,
            } => {
                if self.store.market_by_chain_id(*chain_id).await.is_ok() {
                    tracing::debug!(chain_id, "Creation event for known market, ignoring");
                    return Ok(());
                }
                let mut market =
                    Market::new(question.clone(), "", outcomes.clone(), *end_time);
                market.chain_id = Some(*chain_id);
                self.store.insert_market(market).await?;
                tracing::info!(chain_id, question = %question, "Market created from chain event");
                Ok(())
            }
            LedgerEvent::MarketClosed { chain_id } => {
                let market = self.store.market_by_chain_id(*chain_id).await?;
                self.merge(market.id, ChainStatus::Closed, None).await?;
                Ok(())
            }
            LedgerEvent::MarketResolved { chain_id, outcome } => {
                let market = self.store.market_by_chain_id(*chain_id).await?;
                self.merge(market.id, ChainStatus::Resolved, Some(*outcome))
                    .await?;
                Ok(())
            }
        }
    }

    /// Merge an observed chain status into the local record.
    ///
    /// The status check and write happen inside the per-record lock, so a
    /// racing observer of the same resolution sees `NoChange` and never
    /// double-triggers settlement. A Resolved observation with no outcome
    /// index is refused: settlement must never run against a guessed
    /// outcome, and the next sweep retries once the node reports a sane
    /// struct.
    async fn merge(
        &self,
        market_id: Uuid,
        chain_status: ChainStatus,
        resolved_outcome: Option<u8>,
    ) -> anyhow::Result<Merge> {
        let target = match chain_status {
            ChainStatus::Active => MarketStatus::Active,
            ChainStatus::Closed => MarketStatus::Closed,
            ChainStatus::Resolved => MarketStatus::Resolved,
            ChainStatus::Invalid => MarketStatus::Invalid,
        };

        if target == MarketStatus::Resolved && resolved_outcome.is_none() {
            return Err(LedgerError::InvalidResponse(format!(
                "resolved market {} carries no outcome index",
                market_id
            ))
            .into());
        }

        let merge = self
            .store
            .update_market(market_id, move |market| {
                if !market.status.can_advance_to(target) {
                    return Merge::NoChange;
                }
                match (target, resolved_outcome) {
                    (MarketStatus::Resolved, Some(outcome)) => {
                        market.status = target;
                        market.resolved_outcome = Some(outcome);
                        market.resolution_time = Some(Utc::now());
                        Merge::FreshlyResolved(outcome)
                    }
                    (MarketStatus::Resolved, None) => Merge::NoChange,
                    (MarketStatus::Invalid, _) => {
                        market.status = target;
                        market.resolution_time = Some(Utc::now());
                        Merge::Advanced
                    }
                    _ => {
                        market.status = target;
                        Merge::Advanced
                    }
                }
            })
            .await?;

        match merge {
            Merge::NoChange => {
                tracing::debug!(%market_id, ?chain_status, "Local status already current");
            }
            Merge::Advanced => {
                tracing::info!(%market_id, status = %target, "Local status advanced");
            }
            Merge::FreshlyResolved(outcome) => {
                tracing::info!(%market_id, outcome, "Market freshly resolved, settling");
                self.settlement.settle(market_id, outcome).await?;
            }
        }

        Ok(merge)
    }
}
