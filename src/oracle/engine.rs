//! Resolution engine
//!
//! Drives close+resolve for markets past their closing time: close the
//! market on chain, ask the decision service for a verdict, and only
//! submit a resolve transaction for an unambiguous yes/no. Every failure
//! mode leaves the market closed-but-unresolved; the next sweep or the
//! reconciler converges it.

use super::{DecisionContext, DecisionProvider, ResolutionDecision};
use crate::ledger::{LedgerClient, LedgerError};
use crate::scheduler::SweepGuard;
use crate::settlement::SettlementProcessor;
use crate::store::{Market, MarketStatus, MarketStore};
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// How long to wait for a transaction to confirm
    pub confirmation_timeout: Duration,
    /// Pause between markets within one sweep (decision-service rate
    /// limits, ledger nonce ordering for a single signing identity)
    pub inter_market_delay: Duration,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(60),
            inter_market_delay: Duration::from_millis(500),
        }
    }
}

/// Aggregate result of one resolution sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionSweepReport {
    /// Markets past closing that were attempted
    pub eligible: usize,
    /// Markets resolved on chain
    pub resolved: usize,
    /// Markets left closed on an invalid verdict
    pub abstained: usize,
    /// Markets abandoned this tick on an error
    pub failed: usize,
}

/// Automated close+resolve driver
pub struct ResolutionEngine<S, L, D> {
    store: Arc<S>,
    ledger: Arc<L>,
    decider: Arc<D>,
    settlement: Arc<SettlementProcessor<S>>,
    guard: SweepGuard,
    config: ResolutionConfig,
}

impl<S, L, D> ResolutionEngine<S, L, D>
where
    S: MarketStore,
    L: LedgerClient,
    D: DecisionProvider,
{
    /// Create a new engine. The guard must be shared with whatever
    /// schedules `sweep` so that out-of-band attempts serialize behind it.
    pub fn new(
        store: Arc<S>,
        ledger: Arc<L>,
        decider: Arc<D>,
        settlement: Arc<SettlementProcessor<S>>,
        guard: SweepGuard,
        config: ResolutionConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            decider,
            settlement,
            guard,
            config,
        }
    }

    /// Whether the decision service has credentials
    pub fn is_configured(&self) -> bool {
        self.decider.is_configured()
    }

    /// Markets awaiting resolution: active ones past their closing time,
    /// plus closed ones whose outcome is still missing (a prior decision
    /// attempt failed and is retried here).
    pub async fn eligible_markets(&self) -> Vec<Market> {
        let now = Utc::now();
        let mut candidates = self.store.markets_by_status(MarketStatus::Active).await;
        candidates.extend(self.store.markets_by_status(MarketStatus::Closed).await);
        candidates
            .into_iter()
            .filter(|m| m.needs_resolution(now) && m.chain_id.is_some())
            .collect()
    }

    /// One resolution sweep over all eligible markets.
    ///
    /// Markets are processed sequentially with a short delay between them;
    /// per-market failures never abort the sweep. The caller is expected
    /// to hold the sweep guard (the scheduler does this).
    pub async fn sweep(&self) -> ResolutionSweepReport {
        let eligible = self.eligible_markets().await;
        let mut report = ResolutionSweepReport {
            eligible: eligible.len(),
            ..Default::default()
        };

        telemetry::set_gauge(GaugeMetric::EligibleMarkets, eligible.len() as f64);

        for (i, market) in eligible.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.inter_market_delay).await;
            }

            match self.resolve_market(market).await {
                Ok(updated) if updated.status == MarketStatus::Resolved => report.resolved += 1,
                Ok(_) => report.abstained += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        market_id = %market.id,
                        error = %e,
                        "Resolution abandoned for this tick"
                    );
                }
            }
        }

        telemetry::increment(CounterMetric::ResolutionSweeps, 1);
        telemetry::increment(CounterMetric::MarketsResolved, report.resolved as u64);

        tracing::info!(
            eligible = report.eligible,
            resolved = report.resolved,
            abstained = report.abstained,
            failed = report.failed,
            "Resolution sweep complete"
        );

        report
    }

    /// Out-of-band resolution attempt for one market, serialized behind
    /// the sweep guard.
    pub async fn resolve_now(&self, market_id: Uuid) -> anyhow::Result<Market> {
        let _permit = self.guard.acquire().await;
        let market = self.store.market(market_id).await?;
        self.resolve_market(&market).await
    }

    /// Close and, verdict permitting, resolve one market.
    ///
    /// Returns the updated market; a market left at Closed is a valid
    /// outcome (conservative default), not an error.
    pub async fn resolve_market(&self, market: &Market) -> anyhow::Result<Market> {
        let Some(chain_id) = market.chain_id else {
            anyhow::bail!("Market {} is not anchored to a chain id", market.id);
        };
        if !market.needs_resolution(Utc::now()) {
            anyhow::bail!(
                "Market {} is not eligible for resolution (status {}, closes {})",
                market.id,
                market.status,
                market.closing_time
            );
        }

        // Step 1: close on chain. Transient failures abort resolution for
        // this market only; a rejection means the chain already closed it,
        // so the decision step still runs. Already-closed markets (a prior
        // attempt failed after closing) skip straight to the decision.
        if market.status == MarketStatus::Active {
            match self.ledger.submit_close(chain_id).await {
                Ok(handle) => {
                    let receipt = self
                        .ledger
                        .wait_for_confirmation(&handle, self.config.confirmation_timeout)
                        .await?;
                    tracing::info!(chain_id, tx = %receipt.tx_hash, "Close confirmed");
                }
                Err(LedgerError::Rejected(reason)) => {
                    tracing::info!(chain_id, %reason, "Close rejected, market already closed on chain");
                }
                Err(e) => return Err(e.into()),
            }

            self.store
                .update_market(market.id, |m| {
                    if m.status.can_advance_to(MarketStatus::Closed) {
                        m.status = MarketStatus::Closed;
                    }
                })
                .await?;
        }

        // Step 2: one decision-service call
        let ctx = DecisionContext {
            question: market.question.clone(),
            description: market.description.clone(),
            category: market.category.clone(),
            closing_time: market.closing_time,
            now: Utc::now(),
        };

        let decision = match self.decider.decide(&ctx).await {
            Ok(decision) => decision,
            Err(e) => {
                telemetry::increment(CounterMetric::DecisionFailures, 1);
                return Err(anyhow::anyhow!(e).context(format!(
                    "Decision service failed for market {}; left closed",
                    market.id
                )));
            }
        };

        tracing::info!(
            market_id = %market.id,
            outcome = ?decision.outcome,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "Verdict received"
        );

        // Step 3: an invalid verdict stops at Closed. An unresolved market
        // can be corrected later; a wrongly-resolved one cannot.
        let Some(outcome_index) = decision.outcome.outcome_index() else {
            tracing::warn!(
                market_id = %market.id,
                confidence = decision.confidence,
                "Verdict is invalid, leaving market closed"
            );
            return Ok(self.store.market(market.id).await?);
        };

        // Step 4: resolve on chain, then author the local transition
        self.submit_resolution(market.id, chain_id, outcome_index, &decision)
            .await?;

        Ok(self.store.market(market.id).await?)
    }

    async fn submit_resolution(
        &self,
        market_id: Uuid,
        chain_id: u64,
        outcome_index: u8,
        decision: &ResolutionDecision,
    ) -> anyhow::Result<()> {
        let handle = self.ledger.submit_resolve(chain_id, outcome_index).await?;
        let receipt = self
            .ledger
            .wait_for_confirmation(&handle, self.config.confirmation_timeout)
            .await?;
        tracing::info!(chain_id, tx = %receipt.tx_hash, outcome_index, "Resolve confirmed");

        let freshly_resolved = self
            .store
            .update_market(market_id, move |m| {
                if !m.status.can_advance_to(MarketStatus::Resolved) {
                    return false;
                }
                m.status = MarketStatus::Resolved;
                m.resolved_outcome = Some(outcome_index);
                m.resolution_time = Some(Utc::now());
                true
            })
            .await?;

        // The reconciler may have observed the same resolution through the
        // event feed first; settlement runs once either way.
        if freshly_resolved {
            self.settlement.settle(market_id, outcome_index).await?;
        }

        tracing::info!(
            %market_id,
            outcome_index,
            confidence = decision.confidence,
            "Market resolved"
        );

        Ok(())
    }
}
