//! Sync command implementation

use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct SyncArgs {}

impl SyncArgs {
    /// One bootstrap + reconciliation sweep, then exit
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let services = super::build_services(config);

        let inserted = services.reconciler.bootstrap().await?;
        let report = services.reconciler.sync_all().await;

        println!("Reconciliation sweep complete");
        println!("  Bootstrapped: {}", inserted);
        println!("  Examined:     {}", report.examined);
        println!("  Advanced:     {}", report.advanced);
        println!("  Settled:      {}", report.settled);
        println!("  Failed:       {}", report.failed);

        Ok(())
    }
}
