//! # CSV Replay - Replay Recorded CSV Rows onto a Kafka Topic
//!
//! Standalone utility that streams the rows of one or more CSV files onto a
//! Kafka topic as JSON objects, one per row, keyed by the CSV header. It
//! does not participate in the correlated generation engine: no reference
//! pool, no rate limiter, no relationships — just a literal row-by-row
//! replay at an optional fixed delay. Useful for replaying a previously
//! captured dataset against a topic without re-running the full pipeline.
//!
//! ## Usage
//!
//! ```bash
//! csv-replay -i orders.csv -t orders --delay-ms 50
//! csv-replay -i "fixtures/*.csv" -t events --dry-run
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use glob::glob;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "csv-replay", about = "Replay recorded CSV rows onto a Kafka topic")]
struct Args {
    /// Path to a CSV file or a glob pattern matching several.
    #[arg(short, long)]
    input: PathBuf,

    /// Kafka brokers (comma-separated).
    #[arg(short, long, default_value = "localhost:9092")]
    brokers: String,

    /// Destination Kafka topic.
    #[arg(short, long)]
    topic: String,

    /// CSV column to use as the message key; unset means null key.
    #[arg(long)]
    key_column: Option<String>,

    /// Delay between rows in milliseconds (0 = no delay).
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Don't actually send messages; print what would be sent.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value_t = 1000)]
    progress_interval: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let files = resolve_files(&args.input)?;
    if files.is_empty() {
        warn!("no CSV files matched {}", args.input.display());
        return Ok(());
    }

    let producer: Option<FutureProducer> = if args.dry_run {
        None
    } else {
        Some(
            ClientConfig::new()
                .set("bootstrap.servers", &args.brokers)
                .set("message.timeout.ms", "30000")
                .create()
                .context("failed to create Kafka producer")?,
        )
    };

    let mut total = 0usize;
    for file in &files {
        total += replay_file(file, &args, producer.as_ref()).await?;
    }

    if let Some(producer) = &producer {
        producer
            .flush(Duration::from_secs(10))
            .context("failed to flush producer")?;
    }

    info!("replayed {total} row(s) from {} file(s)", files.len());
    Ok(())
}

fn resolve_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in glob(&input.to_string_lossy())? {
        if let Ok(path) = entry {
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

async fn replay_file(path: &Path, args: &Args, producer: Option<&FutureProducer>) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut sent = 0usize;
    for record in reader.records() {
        let record = record?;
        let mut object = Map::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            object.insert(name.to_string(), Value::String(value.to_string()));
        }
        let key = args
            .key_column
            .as_ref()
            .and_then(|col| object.get(col))
            .and_then(Value::as_str)
            .map(str::to_string);

        let payload = serde_json::to_vec(&Value::Object(object))?;

        if let Some(producer) = producer {
            let mut future_record = FutureRecord::to(&args.topic).payload(&payload);
            if let Some(k) = &key {
                future_record = future_record.key(k);
            }
            if let Err((e, _)) = producer.send(future_record, Duration::from_secs(5)).await {
                warn!("failed to send row {sent} of {}: {e}", path.display());
            }
        } else {
            info!(
                "[dry-run] topic={} key={:?} bytes={}",
                args.topic,
                key,
                payload.len()
            );
        }

        sent += 1;
        if args.delay_ms > 0 {
            sleep(Duration::from_millis(args.delay_ms)).await;
        }
        if sent % args.progress_interval == 0 {
            info!("progress: {sent} rows replayed from {}", path.display());
        }
    }

    Ok(sent)
}
