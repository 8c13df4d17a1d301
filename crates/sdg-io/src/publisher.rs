//! Broker Publisher (component F): non-blocking submit with delivery-ack
//! accounting tracked asynchronously, per spec.md §4.F.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use sdg_core::CoreError;
use tracing::warn;

#[derive(Debug, Default)]
pub struct PublisherCounters {
    pub sent: AtomicU64,
    pub acked: AtomicU64,
    pub failed: AtomicU64,
}

impl PublisherCounters {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.sent.load(Ordering::Relaxed),
            self.acked.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Hand `payload` to the broker client and return once the record is
    /// submitted (not acked); delivery is tracked asynchronously against the
    /// topic's counters. `key` is `None` when no `key_field` was configured
    /// (broker default partitioning applies).
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<(), CoreError>;

    /// Block until all in-flight records are acked or `timeout` elapses;
    /// returns the residual in-flight count.
    async fn flush(&self, timeout: Duration) -> usize;

    /// Snapshot of `(sent, acked, failed)` for a single topic.
    fn counters_for(&self, topic: &str) -> (u64, u64, u64);

    /// Count one failure against `topic` for an outcome the publisher itself
    /// never saw (e.g. a caller exhausting its own retry budget).
    fn record_failure(&self, topic: &str);
}

/// Real Kafka publisher wrapping `rdkafka`'s `FutureProducer`, grounded on
/// the same `ClientConfig`/`FutureRecord` pattern the CLI utilities use.
pub struct KafkaPublisher {
    producer: FutureProducer,
    counters: RwLock<HashMap<String, Arc<PublisherCounters>>>,
}

impl KafkaPublisher {
    pub fn new(bootstrap_servers: &str) -> Result<Self, CoreError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| CoreError::Delivery {
                topic: "<producer-init>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            producer,
            counters: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_client_config(config: ClientConfig) -> Result<Self, CoreError> {
        let producer: FutureProducer = config.create().map_err(|e| CoreError::Delivery {
            topic: "<producer-init>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            producer,
            counters: RwLock::new(HashMap::new()),
        })
    }

    fn counters_slot(&self, topic: &str) -> Arc<PublisherCounters> {
        if let Some(c) = self.counters.read().get(topic) {
            return c.clone();
        }
        self.counters
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(PublisherCounters::default()))
            .clone()
    }
}

#[async_trait]
impl BrokerPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<(), CoreError> {
        let counters = self.counters_slot(topic);
        let mut record = FutureRecord::to(topic).payload(&payload);
        if let Some(k) = key {
            record = record.key(k);
        }
        // send_result enqueues synchronously (QueueFull surfaces here) and
        // returns a future that resolves on delivery; awaiting that future
        // in a spawned task keeps submit and ack as distinct events.
        match self.producer.send_result(record) {
            Ok(delivery) => {
                counters.sent.fetch_add(1, Ordering::Relaxed);
                let counters = counters.clone();
                let topic = topic.to_string();
                tokio::spawn(async move {
                    match delivery.await {
                        Ok(Ok(_)) => {
                            counters.acked.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err((e, _))) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(topic, error = %e, "delivery failed after submit");
                        }
                        Err(_) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(topic, "delivery future cancelled");
                        }
                    }
                });
                Ok(())
            }
            Err((e, _)) => {
                if is_queue_full(&e) {
                    Err(CoreError::QueueFull)
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    Err(CoreError::Delivery {
                        topic: topic.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> usize {
        match self.producer.flush(timeout) {
            Ok(()) => 0,
            Err(e) => {
                warn!("flush did not fully drain: {e}");
                self.producer.in_flight_count().max(0) as usize
            }
        }
    }

    fn counters_for(&self, topic: &str) -> (u64, u64, u64) {
        self.counters_slot(topic).snapshot()
    }

    fn record_failure(&self, topic: &str) {
        self.counters_slot(topic).failed.fetch_add(1, Ordering::Relaxed);
    }
}

fn is_queue_full(err: &rdkafka::error::KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(rdkafka::types::RDKafkaErrorCode::QueueFull)
    )
}

/// Stand-in publisher for `dry_run` mode: writes records to stdout instead
/// of opening a broker connection, per spec.md §6 ("no network connections
/// are made").
#[derive(Default)]
pub struct DryRunPublisher {
    counters: RwLock<HashMap<String, Arc<PublisherCounters>>>,
}

impl DryRunPublisher {
    fn counters_slot(&self, topic: &str) -> Arc<PublisherCounters> {
        if let Some(c) = self.counters.read().get(topic) {
            return c.clone();
        }
        self.counters
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(PublisherCounters::default()))
            .clone()
    }
}

#[async_trait]
impl BrokerPublisher for DryRunPublisher {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<(), CoreError> {
        let counters = self.counters_slot(topic);
        counters.sent.fetch_add(1, Ordering::Relaxed);
        println!(
            "[dry-run] topic={topic} key={} bytes={}",
            key.unwrap_or("<none>"),
            payload.len()
        );
        counters.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> usize {
        0
    }

    fn counters_for(&self, topic: &str) -> (u64, u64, u64) {
        self.counters_slot(topic).snapshot()
    }

    fn record_failure(&self, topic: &str) {
        self.counters_slot(topic).failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_publisher_counts_without_network() {
        let publisher = DryRunPublisher::default();
        publisher
            .publish("customers", Some("CUST_0001"), b"{}".to_vec())
            .await
            .unwrap();
        let (sent, acked, failed) = publisher.counters_for("customers");
        assert_eq!((sent, acked, failed), (1, 1, 0));
    }

    #[tokio::test]
    async fn dry_run_flush_is_immediate() {
        let publisher = DryRunPublisher::default();
        assert_eq!(publisher.flush(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn dry_run_counters_are_tracked_independently_per_topic() {
        let publisher = DryRunPublisher::default();
        publisher.publish("customers", None, vec![]).await.unwrap();
        publisher.publish("orders", None, vec![]).await.unwrap();
        publisher.publish("orders", None, vec![]).await.unwrap();
        assert_eq!(publisher.counters_for("customers"), (1, 1, 0));
        assert_eq!(publisher.counters_for("orders"), (2, 2, 0));
    }

    #[tokio::test]
    async fn record_failure_increments_only_the_named_topic() {
        let publisher = DryRunPublisher::default();
        publisher.publish("customers", None, vec![]).await.unwrap();
        publisher.record_failure("orders");
        assert_eq!(publisher.counters_for("customers"), (1, 1, 0));
        assert_eq!(publisher.counters_for("orders"), (0, 0, 1));
    }
}
