//! CLI interface for polysettle
//!
//! Provides subcommands for:
//! - `run`: Start the sync/settlement daemon
//! - `sync`: Run one reconciliation sweep and exit
//! - `resolve`: Run one resolution sweep (or one market) and exit
//! - `status`: Show ledger connectivity and eligible markets
//! - `config`: Show current configuration

mod resolve;
mod run;
mod sync;

pub use resolve::ResolveArgs;
pub use run::RunArgs;
pub use sync::SyncArgs;

use crate::config::Config;
use crate::ledger::{NodeConfig, NodeLedgerClient};
use crate::oracle::{LlmConfig, LlmDecisionClient, ResolutionConfig, ResolutionEngine};
use crate::reconciler::Reconciler;
use crate::scheduler::SweepGuard;
use crate::settlement::SettlementProcessor;
use crate::store::MemoryStore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "polysettle")]
#[command(about = "Market lifecycle synchronization and settlement engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the sync/settlement daemon
    Run(RunArgs),
    /// Run one reconciliation sweep and exit
    Sync(SyncArgs),
    /// Run one resolution sweep (or one market) and exit
    Resolve(ResolveArgs),
    /// Show ledger connectivity and eligible markets
    Status,
    /// Show current configuration
    Config,
}

/// Wired-up components shared by the subcommands
pub(crate) struct Services {
    pub store: Arc<MemoryStore>,
    pub reconciler: Arc<Reconciler<MemoryStore, NodeLedgerClient>>,
    pub engine: Arc<ResolutionEngine<MemoryStore, NodeLedgerClient, LlmDecisionClient>>,
    pub resolution_guard: SweepGuard,
    pub reconcile_guard: SweepGuard,
}

pub(crate) fn build_services(config: &Config) -> Services {
    let store = Arc::new(MemoryStore::new());

    let ledger = Arc::new(NodeLedgerClient::with_config(NodeConfig {
        base_url: config.ledger.http_url.clone(),
        request_timeout: Duration::from_secs(config.ledger.request_timeout_secs),
        poll_interval: Duration::from_secs(config.ledger.poll_interval_secs),
    }));

    let settlement = Arc::new(SettlementProcessor::new(store.clone()));

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        ledger.clone(),
        settlement.clone(),
    ));

    let decider = Arc::new(LlmDecisionClient::new(
        LlmConfig {
            api_key: config.oracle.api_key.clone(),
            base_url: config.oracle.base_url.clone(),
            model: config.oracle.model.clone(),
            timeout_secs: config.oracle.timeout_secs,
        }
        .with_env_key(),
    ));

    let resolution_guard = SweepGuard::new("resolution");
    let reconcile_guard = SweepGuard::new("reconcile");

    let engine = Arc::new(ResolutionEngine::new(
        store.clone(),
        ledger.clone(),
        decider,
        settlement,
        resolution_guard.clone(),
        ResolutionConfig {
            confirmation_timeout: Duration::from_secs(config.ledger.confirmation_timeout_secs),
            inter_market_delay: Duration::from_millis(config.scheduler.inter_market_delay_ms),
        },
    ));

    Services {
        store,
        reconciler,
        engine,
        resolution_guard,
        reconcile_guard,
    }
}
