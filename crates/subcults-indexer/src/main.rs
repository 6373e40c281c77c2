//! subcults-indexer - Jetstream ingestion agent
//!
//! Connects to a Jetstream endpoint and keeps consuming events until
//! interrupted, periodically reporting connection state and event counts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use subcults_indexer::{ClientConfig, EventCounter, IndexerClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Dispatch};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "subcults-indexer")]
#[command(about = "Subcults Jetstream indexer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexer until interrupted
    Run {
        /// Path to a JSON config file
        #[arg(short, long, env = "INDEXER_CONFIG")]
        config: Option<PathBuf>,

        /// Jetstream WebSocket URL (overrides the config file)
        #[arg(long, env = "JETSTREAM_URL")]
        endpoint: Option<String>,

        /// Collection NSID to subscribe to (repeatable)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Emit logs as JSON
        #[arg(long)]
        json: bool,

        /// Seconds between status reports
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        status_interval_secs: u64,
    },

    /// Write a default config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "indexer.json")]
        output: PathBuf,
    },

    /// Validate a config file and print the subscribe URL
    CheckConfig {
        /// Path to config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            endpoint,
            collections,
            json,
            status_interval_secs,
        } => {
            let dispatch = init_tracing(json)?;
            let config = load_config(config, endpoint, collections)?;
            run_indexer(config, dispatch, Duration::from_secs(status_interval_secs)).await?;
        }

        Commands::InitConfig { output } => {
            let json = ClientConfig::default().to_json_pretty()?;
            std::fs::write(&output, json)?;
            println!("Wrote default config to {}", output.display());
        }

        Commands::CheckConfig { config } => {
            let config = ClientConfig::from_file(&config)?;
            println!("Config OK");
            println!("  subscribe URL: {}", config.subscribe_url()?);
            println!(
                "  retry delay:   {:?} .. {:?} (jitter {})",
                config.base_delay(),
                config.max_delay(),
                config.jitter
            );
        }
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<Dispatch> {
    let filter = EnvFilter::from_default_env().add_directive("subcults_indexer=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);

    let dispatch = if json {
        Dispatch::new(registry.with(fmt::layer().json()))
    } else {
        Dispatch::new(registry.with(fmt::layer()))
    };

    tracing::dispatcher::set_global_default(dispatch.clone())?;
    Ok(dispatch)
}

fn load_config(
    path: Option<PathBuf>,
    endpoint: Option<String>,
    collections: Vec<String>,
) -> anyhow::Result<ClientConfig> {
    let mut config = match path {
        Some(path) => {
            info!(config = %path.display(), "loading config");
            ClientConfig::from_file(&path)?
        }
        None => ClientConfig::default(),
    };

    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if !collections.is_empty() {
        config.wanted_collections = collections;
    }

    Ok(config)
}

async fn run_indexer(
    config: ClientConfig,
    dispatch: Dispatch,
    status_interval: Duration,
) -> anyhow::Result<()> {
    let client = Arc::new(IndexerClient::new(config, EventCounter::new(), dispatch)?);
    info!(url = client.url(), "starting subcults indexer");

    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
        }
        shutdown.cancel();
    });

    let reporter = {
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(status_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => report_status(&client),
                }
            }
        })
    };

    match client.run(cancel).await {
        Err(e) if e.is_cancelled() => info!("indexer stopped"),
        Err(e) => return Err(e.into()),
        Ok(()) => {}
    }

    reporter.await?;
    report_status(&client);
    Ok(())
}

fn report_status(client: &IndexerClient<EventCounter>) {
    let counts = client.handler().snapshot();
    info!(
        connected = client.is_connected(),
        state = %client.state(),
        messages = counts.messages,
        bytes = counts.bytes,
        commits = counts.commits,
        identities = counts.identities,
        accounts = counts.accounts,
        other = counts.other,
        malformed = counts.malformed,
        "indexer status"
    );
}
