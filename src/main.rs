use clap::Parser;
use polysettle::cli::{Cli, Commands};
use polysettle::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    polysettle::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting sync/settlement daemon");
            args.execute(&config).await?;
        }
        Commands::Sync(args) => {
            tracing::info!("Starting one-shot reconciliation sweep");
            args.execute(&config).await?;
        }
        Commands::Resolve(args) => {
            tracing::info!("Starting one-shot resolution sweep");
            args.execute(&config).await?;
        }
        Commands::Status => {
            println!("polysettle status");
            println!("  Ledger node: {}", config.ledger.http_url);
            println!("  Event feed:  {}", config.ledger.ws_url);
            println!(
                "  Oracle: {} ({})",
                if config.oracle.enabled {
                    "enabled"
                } else {
                    "disabled"
                },
                config.oracle.model
            );
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Ledger: {}", config.ledger.http_url);
            println!(
                "  Confirmation timeout: {}s",
                config.ledger.confirmation_timeout_secs
            );
            println!(
                "  Sweeps: reconcile every {}s, resolve every {}s",
                config.scheduler.reconcile_interval_secs, config.scheduler.resolve_interval_secs
            );
            println!("  API: port {}", config.api.port);
            println!("  Metrics: port {}", config.telemetry.metrics_port);
        }
    }

    Ok(())
}
