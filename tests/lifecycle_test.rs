//! End-to-end lifecycle tests
//!
//! Drives the reconciler, resolution engine and settlement processor
//! together over an in-memory store, a scripted ledger and a scripted
//! decision provider.

use async_trait::async_trait;
use chrono::Utc;
use polysettle::ledger::{
    ChainMarket, ChainStatus, LedgerClient, LedgerError, LedgerEvent, TxHandle, TxReceipt,
};
use polysettle::oracle::{
    DecisionContext, DecisionError, DecisionOutcome, DecisionProvider, ResolutionConfig,
    ResolutionDecision, ResolutionEngine,
};
use polysettle::reconciler::Reconciler;
use polysettle::scheduler::SweepGuard;
use polysettle::settlement::SettlementProcessor;
use polysettle::store::{Market, MarketStatus, MarketStore, MemoryStore, PositionStatus};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Scripted ledger: close/resolve transactions mutate the scripted chain
/// state, so the reconciler observes what the engine submitted.
#[derive(Default)]
struct ScriptedLedger {
    markets: RwLock<HashMap<u64, ChainMarket>>,
}

impl ScriptedLedger {
    async fn create_market(&self, chain_id: u64, status: ChainStatus, outcome: Option<u8>) {
        let mut markets = self.markets.write().await;
        markets.insert(
            chain_id,
            ChainMarket {
                chain_id,
                status,
                resolved_outcome: outcome,
                end_time: Utc::now() - chrono::Duration::minutes(1),
                question: Some(format!("Question for market {}?", chain_id)),
                outcomes: Some(vec!["yes".to_string(), "no".to_string()]),
            },
        );
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn read_market(&self, chain_id: u64) -> Result<ChainMarket, LedgerError> {
        let markets = self.markets.read().await;
        markets
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| LedgerError::Rpc(format!("no market {}", chain_id)))
    }

    async fn market_count(&self) -> Result<u64, LedgerError> {
        let markets = self.markets.read().await;
        Ok(markets.keys().max().copied().unwrap_or(0))
    }

    async fn submit_close(&self, chain_id: u64) -> Result<TxHandle, LedgerError> {
        let mut markets = self.markets.write().await;
        let market = markets
            .get_mut(&chain_id)
            .ok_or_else(|| LedgerError::Rejected("unknown market".to_string()))?;
        if market.status != ChainStatus::Active {
            return Err(LedgerError::Rejected("not active".to_string()));
        }
        market.status = ChainStatus::Closed;
        Ok(TxHandle(format!("0xclose-{}", chain_id)))
    }

    async fn submit_resolve(
        &self,
        chain_id: u64,
        outcome_index: u8,
    ) -> Result<TxHandle, LedgerError> {
        let mut markets = self.markets.write().await;
        let market = markets
            .get_mut(&chain_id)
            .ok_or_else(|| LedgerError::Rejected("unknown market".to_string()))?;
        if market.status == ChainStatus::Resolved {
            return Err(LedgerError::Rejected("already resolved".to_string()));
        }
        market.status = ChainStatus::Resolved;
        market.resolved_outcome = Some(outcome_index);
        Ok(TxHandle(format!("0xresolve-{}", chain_id)))
    }

    async fn wait_for_confirmation(
        &self,
        handle: &TxHandle,
        _timeout: Duration,
    ) -> Result<TxReceipt, LedgerError> {
        Ok(TxReceipt {
            tx_hash: handle.0.clone(),
            block_number: 42,
        })
    }
}

/// Decision provider returning a fixed reply
struct FixedDecider(Result<ResolutionDecision, &'static str>);

#[async_trait]
impl DecisionProvider for FixedDecider {
    async fn decide(&self, _ctx: &DecisionContext) -> Result<ResolutionDecision, DecisionError> {
        match &self.0 {
            Ok(decision) => Ok(decision.clone()),
            Err(msg) => Err(DecisionError::MalformedReply(msg.to_string())),
        }
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn yes_decider() -> FixedDecider {
    FixedDecider(Ok(ResolutionDecision {
        outcome: DecisionOutcome::Yes,
        confidence: 92,
        reasoning: "it happened".to_string(),
        sources: vec!["news".to_string()],
    }))
}

struct Harness {
    store: Arc<MemoryStore>,
    ledger: Arc<ScriptedLedger>,
    reconciler: Arc<Reconciler<MemoryStore, ScriptedLedger>>,
    engine: Arc<ResolutionEngine<MemoryStore, ScriptedLedger, FixedDecider>>,
}

fn harness(decider: FixedDecider) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(ScriptedLedger::default());
    let settlement = Arc::new(SettlementProcessor::new(store.clone()));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        ledger.clone(),
        settlement.clone(),
    ));
    let engine = Arc::new(ResolutionEngine::new(
        store.clone(),
        ledger.clone(),
        Arc::new(decider),
        settlement,
        SweepGuard::new("resolution"),
        ResolutionConfig {
            confirmation_timeout: Duration::from_secs(5),
            inter_market_delay: Duration::from_millis(1),
        },
    ));

    Harness {
        store,
        ledger,
        reconciler,
        engine,
    }
}

async fn insert_anchored_market(store: &MemoryStore, chain_id: u64) -> uuid::Uuid {
    let mut market = Market::new(
        format!("Question for market {}?", chain_id),
        "test",
        vec!["yes".to_string(), "no".to_string()],
        Utc::now() - chrono::Duration::minutes(1),
    );
    market.chain_id = Some(chain_id);
    let id = market.id;
    store.insert_market(market).await.unwrap();
    id
}

#[tokio::test]
async fn end_to_end_resolution_and_settlement() {
    let h = harness(yes_decider());

    // Market M, chain id 7, one open yes position: 100 shares at cost 60
    h.ledger.create_market(7, ChainStatus::Active, None).await;
    let market_id = insert_anchored_market(&h.store, 7).await;
    let position = h
        .store
        .record_trade(market_id, "alice", "yes", dec!(100), dec!(0.6))
        .await
        .unwrap();

    // Resolution sweep at T+1
    let report = h.engine.sweep().await;
    assert_eq!(report.eligible, 1);
    assert_eq!(report.resolved, 1);

    // Local store reflects the resolution
    let market = h.store.market(market_id).await.unwrap();
    assert_eq!(market.status, MarketStatus::Resolved);
    assert_eq!(market.resolved_outcome, Some(0));

    // Chain agrees
    let chain = h.ledger.read_market(7).await.unwrap();
    assert_eq!(chain.status, ChainStatus::Resolved);
    assert_eq!(chain.resolved_outcome, Some(0));

    // Position settled: payout 100, realized P&L 40
    let settled = h.store.position(position.id).await.unwrap();
    assert_eq!(settled.status, PositionStatus::Closed);
    assert_eq!(settled.realized_pnl, dec!(40));
    assert_eq!(h.store.user_pnl("alice").await, dec!(40));
}

#[tokio::test]
async fn malformed_decision_reply_leaves_market_closed() {
    let h = harness(FixedDecider(Err("reply had no JSON")));

    h.ledger.create_market(7, ChainStatus::Active, None).await;
    let market_id = insert_anchored_market(&h.store, 7).await;

    let report = h.engine.sweep().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.resolved, 0);

    let market = h.store.market(market_id).await.unwrap();
    assert_eq!(market.status, MarketStatus::Closed);
    assert_eq!(market.resolved_outcome, None);

    // The close went through on chain; only the resolve was withheld
    let chain = h.ledger.read_market(7).await.unwrap();
    assert_eq!(chain.status, ChainStatus::Closed);

    // The closed market is still eligible, so a later sweep retries it
    let retry = h.engine.sweep().await;
    assert_eq!(retry.eligible, 1);
    assert_eq!(retry.failed, 1);
    assert_eq!(
        h.store.market(market_id).await.unwrap().status,
        MarketStatus::Closed
    );
}

#[tokio::test]
async fn convergence_under_repeated_sync_and_events() {
    let h = harness(yes_decider());

    h.ledger
        .create_market(9, ChainStatus::Resolved, Some(0))
        .await;
    let market_id = insert_anchored_market(&h.store, 9).await;
    h.store
        .record_trade(market_id, "bob", "no", dec!(15), dec!(1))
        .await
        .unwrap();

    // Any interleaving of polling and events converges to the same state
    for round in 0..5 {
        if round % 2 == 0 {
            h.reconciler.sync_all().await;
        } else {
            h.reconciler
                .apply_event(&LedgerEvent::MarketResolved {
                    chain_id: 9,
                    outcome: 0,
                })
                .await
                .unwrap();
        }
    }

    let market = h.store.market(market_id).await.unwrap();
    assert_eq!(market.status, MarketStatus::Resolved);
    assert_eq!(market.resolved_outcome, Some(0));

    // Losing position settled exactly once despite repeated observations
    assert_eq!(h.store.user_pnl("bob").await, dec!(-15));
}

#[tokio::test]
async fn status_never_moves_backward() {
    let h = harness(yes_decider());

    h.ledger
        .create_market(3, ChainStatus::Resolved, Some(1))
        .await;
    let market_id = insert_anchored_market(&h.store, 3).await;

    h.reconciler.sync_all().await;
    assert_eq!(
        h.store.market(market_id).await.unwrap().status,
        MarketStatus::Resolved
    );

    // A stale close event arriving after resolution is a no-op
    h.reconciler
        .apply_event(&LedgerEvent::MarketClosed { chain_id: 3 })
        .await
        .unwrap();

    let market = h.store.market(market_id).await.unwrap();
    assert_eq!(market.status, MarketStatus::Resolved);
    assert_eq!(market.resolved_outcome, Some(1));
}

#[tokio::test]
async fn concurrent_sweeps_on_disjoint_markets() {
    let h = harness(yes_decider());

    // Market 1 is past closing and eligible for resolution; market 2 was
    // already resolved on chain and only needs reconciliation.
    h.ledger.create_market(1, ChainStatus::Active, None).await;
    h.ledger.create_market(2, ChainStatus::Resolved, Some(1)).await;
    let resolve_id = insert_anchored_market(&h.store, 1).await;
    let sync_id = {
        let mut market = Market::new(
            "Question for market 2?",
            "test",
            vec!["yes".to_string(), "no".to_string()],
            Utc::now() + chrono::Duration::hours(1),
        );
        market.chain_id = Some(2);
        let id = market.id;
        h.store.insert_market(market).await.unwrap();
        id
    };

    let resolution = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.sweep().await })
    };
    let reconcile = {
        let reconciler = h.reconciler.clone();
        tokio::spawn(async move { reconciler.sync_all().await })
    };

    resolution.await.unwrap();
    reconcile.await.unwrap();

    // Run one more reconcile so the slower path observes final chain truth
    h.reconciler.sync_all().await;

    let resolved = h.store.market(resolve_id).await.unwrap();
    assert_eq!(resolved.status, MarketStatus::Resolved);
    assert_eq!(resolved.resolved_outcome, Some(0));

    let synced = h.store.market(sync_id).await.unwrap();
    assert_eq!(synced.status, MarketStatus::Resolved);
    assert_eq!(synced.resolved_outcome, Some(1));
}

#[tokio::test]
async fn bootstrap_then_sweep_resolves_discovered_market() {
    let h = harness(yes_decider());

    // Chain already has a resolved market the store has never seen
    h.ledger.create_market(1, ChainStatus::Active, None).await;

    let inserted = h.reconciler.bootstrap().await.unwrap();
    assert_eq!(inserted, 1);

    let market = h.store.market_by_chain_id(1).await.unwrap();
    assert_eq!(market.question, "Question for market 1?");
    assert_eq!(market.status, MarketStatus::Active);

    // Trade arrives, then the engine resolves it
    h.store
        .record_trade(market.id, "carol", "yes", dec!(40), dec!(0.5))
        .await
        .unwrap();
    let report = h.engine.sweep().await;
    assert_eq!(report.resolved, 1);
    assert_eq!(h.store.user_pnl("carol").await, dec!(20)); // payout 40 - cost 20
}

#[tokio::test]
async fn settle_twice_is_identical() {
    let store = Arc::new(MemoryStore::new());
    let market = Market::new(
        "Twice?",
        "test",
        vec!["yes".to_string(), "no".to_string()],
        Utc::now(),
    );
    let market_id = market.id;
    store.insert_market(market).await.unwrap();
    let a = store
        .record_trade(market_id, "alice", "yes", dec!(40), dec!(0.5))
        .await
        .unwrap();
    let b = store
        .record_trade(market_id, "bob", "no", dec!(15), dec!(1))
        .await
        .unwrap();

    let settlement = SettlementProcessor::new(store.clone());
    settlement.settle(market_id, 0).await.unwrap();
    let first = (
        store.position(a.id).await.unwrap(),
        store.position(b.id).await.unwrap(),
    );

    settlement.settle(market_id, 0).await.unwrap();
    let second = (
        store.position(a.id).await.unwrap(),
        store.position(b.id).await.unwrap(),
    );

    assert_eq!(first.0.realized_pnl, second.0.realized_pnl);
    assert_eq!(first.1.realized_pnl, second.1.realized_pnl);
    assert_eq!(first.0.realized_pnl, dec!(20));
    assert_eq!(first.1.realized_pnl, dec!(-15));
    assert_eq!(store.user_pnl("alice").await, dec!(20));
    assert_eq!(store.user_pnl("bob").await, dec!(-15));
}
