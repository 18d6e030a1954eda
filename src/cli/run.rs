//! Run command implementation

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::ledger::{EventSubscriber, SubscriberConfig};
use crate::scheduler::Scheduler;
use clap::Args;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip the read-model bootstrap from chain
    #[arg(long)]
    pub no_bootstrap: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let services = super::build_services(config);

        if !self.no_bootstrap {
            let inserted = services.reconciler.bootstrap().await?;
            tracing::info!(inserted, "Read-model bootstrapped from ledger");
        }

        // Low-latency path: ledger events applied as they arrive
        let subscriber =
            EventSubscriber::new(SubscriberConfig::new(config.ledger.ws_url.clone()));
        let events = subscriber.subscribe();
        let watch = {
            let reconciler = services.reconciler.clone();
            tokio::spawn(async move { reconciler.watch(events).await })
        };

        // Periodic sweeps
        let mut scheduler = Scheduler::new();
        {
            let reconciler = services.reconciler.clone();
            scheduler.spawn_periodic(
                services.reconcile_guard.clone(),
                Duration::from_secs(config.scheduler.reconcile_interval_secs),
                move || {
                    let reconciler = reconciler.clone();
                    async move {
                        reconciler.sync_all().await;
                    }
                },
            );
        }

        if config.oracle.enabled {
            let engine = services.engine.clone();
            scheduler.spawn_periodic(
                services.resolution_guard.clone(),
                Duration::from_secs(config.scheduler.resolve_interval_secs),
                move || {
                    let engine = engine.clone();
                    async move {
                        engine.sweep().await;
                    }
                },
            );
        } else {
            tracing::info!("Automated resolution disabled by config");
        }

        // Thin HTTP surface
        if config.api.enabled {
            let state = AppState::new(
                services.engine.clone(),
                services.store.clone(),
                config.oracle.enabled,
            );
            let router = create_router(state);
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.api.port));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(%addr, "Oracle API listening");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    tracing::error!(error = %e, "API server failed");
                }
            });
        }

        tracing::info!("polysettle running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;

        // No durable work queue: in-flight calls finish or time out, the
        // next start re-converges from ledger truth.
        tracing::info!("Shutting down");
        scheduler.shutdown();
        watch.abort();

        Ok(())
    }
}
