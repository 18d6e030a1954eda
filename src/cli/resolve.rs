//! Resolve command implementation

use crate::config::Config;
use crate::store::MarketStore;
use clap::Args;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Resolve only the market with this on-chain id
    #[arg(long)]
    pub chain_id: Option<u64>,
}

impl ResolveArgs {
    /// One bootstrap + resolution sweep (or one market), then exit
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if !config.oracle.enabled {
            anyhow::bail!("Automated resolution is disabled in config");
        }

        let services = super::build_services(config);
        services.reconciler.bootstrap().await?;

        match self.chain_id {
            Some(chain_id) => {
                let market = services.store.market_by_chain_id(chain_id).await?;
                let updated = services.engine.resolve_now(market.id).await?;
                println!(
                    "Market {} (chain id {}): status={} resolved_outcome={:?}",
                    updated.id, chain_id, updated.status, updated.resolved_outcome
                );
            }
            None => {
                let report = services.engine.sweep().await;
                println!("Resolution sweep complete");
                println!("  Eligible:  {}", report.eligible);
                println!("  Resolved:  {}", report.resolved);
                println!("  Abstained: {}", report.abstained);
                println!("  Failed:    {}", report.failed);
            }
        }

        Ok(())
    }
}
