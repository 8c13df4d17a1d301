//! # Faker Producer - Non-Correlated One-Shot Faker Producer
//!
//! Emits N independent faker-generated JSON records to a Kafka topic, one
//! shot, with no reference pool, no relationships, and no rate pacing
//! beyond an optional fixed delay between sends. This is the uncorrelated
//! counterpart to the full correlation engine — useful for smoke-testing a
//! topic or schema without standing up a pipeline configuration.
//!
//! ## Usage
//!
//! ```bash
//! faker-producer -t customers -n 1000
//! faker-producer -t customers -n 50 --delay-ms 20 --dry-run
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "faker-producer", about = "Emit N independent faker records to a Kafka topic")]
struct Args {
    /// Kafka brokers (comma-separated).
    #[arg(short, long, default_value = "localhost:9092")]
    brokers: String,

    /// Destination Kafka topic.
    #[arg(short, long)]
    topic: String,

    /// Number of records to emit.
    #[arg(short = 'n', long, default_value_t = 100)]
    count: u64,

    /// Delay between records in milliseconds (0 = no delay).
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Don't actually send messages; print what would be sent.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

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

    let mut sent = 0u64;
    for _ in 0..args.count {
        let record = fake_record();
        let payload = serde_json::to_vec(&record)?;

        if let Some(producer) = &producer {
            let future_record: FutureRecord<'_, (), _> =
                FutureRecord::to(&args.topic).payload(&payload);
            if let Err((e, _)) = producer.send(future_record, Duration::from_secs(5)).await {
                warn!("failed to send record {sent}: {e}");
            }
        } else {
            info!("[dry-run] topic={} bytes={}", args.topic, payload.len());
        }

        sent += 1;
        if args.delay_ms > 0 {
            sleep(Duration::from_millis(args.delay_ms)).await;
        }
    }

    if let Some(producer) = &producer {
        producer
            .flush(Duration::from_secs(10))
            .context("failed to flush producer")?;
    }

    info!("emitted {sent} record(s) to topic '{}'", args.topic);
    Ok(())
}

fn fake_record() -> serde_json::Value {
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "name": Name().fake::<String>(),
        "email": SafeEmail().fake::<String>(),
        "phone_number": PhoneNumber().fake::<String>(),
        "created_at": chrono::Utc::now().to_rfc3339(),
    })
}
