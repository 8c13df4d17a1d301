//! Correlation Orchestrator (component G): the top-level state machine
//! driving Init → BulkLoadMasters → StreamTransactional → Draining → Done
//! (spec.md §4.G, §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sdg_core::{CorrelationConfig, CoreError, EntityDescriptor, FieldDescriptor, SourceKind};
use sdg_gen::{build_record, validate_faker_method, RateLimiter, ReferencePool};
use sdg_io::{BrokerPublisher, RecordEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drain deadline applied after all transactional tasks stop (spec.md §5:
/// "default 30 s").
const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Bounded exponential backoff applied on `QueueFull`, capped per spec.md §7.
const QUEUE_FULL_BACKOFF_BASE_MS: u64 = 10;
const QUEUE_FULL_BACKOFF_CAP_MS: u64 = 100;
const QUEUE_FULL_MAX_RETRIES: u32 = 5;

#[derive(Debug, Default, Clone)]
pub struct EntitySummary {
    pub sent: u64,
    pub acked: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub per_entity: HashMap<String, EntitySummary>,
    pub drain_residual: usize,
}

impl RunSummary {
    /// Exit code per spec.md §6: 0 success, 1 runtime error, 3 drain timeout.
    pub fn exit_code(&self) -> i32 {
        if self.drain_residual > 0 {
            return 3;
        }
        let any_failed = self.per_entity.values().any(|s| s.failed > 0);
        if any_failed {
            1
        } else {
            0
        }
    }
}

/// Init phase: validate configuration before any I/O (spec.md §4.G, §7).
pub fn validate_config(config: &CorrelationConfig) -> Result<(), CoreError> {
    for (name, desc) in config.all_entities() {
        if desc.source != SourceKind::Faker {
            return Err(CoreError::Config(format!(
                "entity '{name}' declares source '{:?}', which is not implemented; only 'faker' is supported",
                desc.source
            )));
        }

        for (fk_field, ref_spec) in &desc.relationships {
            let (target_entity, target_id_field) =
                ref_spec.references.split_once('.').ok_or_else(|| {
                    CoreError::Config(format!(
                        "entity '{name}' relationship '{fk_field}' has malformed references '{}'",
                        ref_spec.references
                    ))
                })?;
            let target = config.entity(target_entity).ok_or_else(|| {
                CoreError::Config(format!(
                    "entity '{name}' relationship '{fk_field}' targets undeclared entity '{target_entity}'"
                ))
            })?;
            if target.id_field != target_id_field {
                return Err(CoreError::Config(format!(
                    "entity '{name}' relationship '{fk_field}' targets '{target_entity}.{target_id_field}' but its id_field is '{}'",
                    target.id_field
                )));
            }
        }

        for (field_name, field) in desc.schema.iter().chain(desc.derived_fields.iter()) {
            validate_field(config, name, desc, field_name, field)?;
        }
    }
    Ok(())
}

fn validate_field(
    config: &CorrelationConfig,
    entity_name: &str,
    desc: &EntityDescriptor,
    field_name: &str,
    field: &FieldDescriptor,
) -> Result<(), CoreError> {
    match field {
        FieldDescriptor::Faker { method } => validate_faker_method(method),
        FieldDescriptor::String {
            format,
            initial_value,
        } => {
            if format.is_some() == initial_value.is_some() {
                Err(CoreError::Config(format!(
                    "entity '{entity_name}' field '{field_name}' must set exactly one of format/initial_value"
                )))
            } else {
                Ok(())
            }
        }
        FieldDescriptor::Reference { source, via } => {
            let (target_entity, target_field) = source.split_once('.').ok_or_else(|| {
                CoreError::Config(format!(
                    "entity '{entity_name}' field '{field_name}' has malformed source '{source}'"
                ))
            })?;
            if !desc.relationships.contains_key(via) {
                return Err(CoreError::Config(format!(
                    "entity '{entity_name}' field '{field_name}' references unbound fk field '{via}'"
                )));
            }
            let target = config.entity(target_entity).ok_or_else(|| {
                CoreError::Config(format!(
                    "entity '{entity_name}' field '{field_name}' targets undeclared entity '{target_entity}'"
                ))
            })?;
            if target_field != target.id_field && !target.schema.contains_key(target_field) {
                return Err(CoreError::Config(format!(
                    "entity '{entity_name}' field '{field_name}' targets undeclared field '{target_entity}.{target_field}'"
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub struct Orchestrator {
    config: CorrelationConfig,
    encoder: Arc<dyn RecordEncoder>,
    publisher: Arc<dyn BrokerPublisher>,
    pool: Arc<ReferencePool>,
}

impl Orchestrator {
    pub fn new(
        config: CorrelationConfig,
        encoder: Arc<dyn RecordEncoder>,
        publisher: Arc<dyn BrokerPublisher>,
    ) -> Self {
        let pool = ReferencePool::new(
            config
                .all_entities()
                .map(|(name, desc)| (name.to_string(), desc.track_recent)),
        );
        Self {
            config,
            encoder,
            publisher,
            pool: Arc::new(pool),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, CoreError> {
        validate_config(&self.config)?;

        self.bulk_load_masters().await?;

        let mut handles = Vec::new();
        for (name, desc) in self.config.transactional_data.clone() {
            let pool = self.pool.clone();
            let encoder = self.encoder.clone();
            let publisher = self.publisher.clone();
            let child = cancel.child_token();
            handles.push(tokio::spawn(async move {
                stream_transactional(name, desc, pool, encoder, publisher, child).await
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let residual = self.publisher.flush(DEFAULT_DRAIN_DEADLINE).await;
        if residual > 0 {
            warn!(residual, "drain deadline exceeded, forcing close");
        }

        Ok(self.summarize(residual))
    }

    async fn bulk_load_masters(&self) -> Result<(), CoreError> {
        for (name, desc) in &self.config.master_data {
            if !desc.bulk_load {
                continue;
            }
            let count = desc.count.unwrap_or(0);
            info!(entity = %name, count, "bulk loading master entity");
            let mut rng = StdRng::from_entropy();
            for seq in 1..=count {
                let record = build_record(name, desc, seq, &self.pool, &mut rng)?;
                let key = desc
                    .key_field
                    .as_ref()
                    .and_then(|f| record.get(f))
                    .map(|v| v.render());
                let payload = self
                    .encoder
                    .encode(&desc.kafka_topic, &record, &desc.nested_fields)
                    .await?;
                self.publisher
                    .publish(&desc.kafka_topic, key.as_deref(), payload)
                    .await?;
                self.pool.append(name, &desc.id_field, record);
            }
        }
        self.publisher.flush(Duration::from_secs(10)).await;
        Ok(())
    }

    fn summarize(&self, residual: usize) -> RunSummary {
        let mut per_entity = HashMap::new();
        for (name, desc) in self.config.all_entities() {
            let (sent, acked, failed) = self.publisher.counters_for(&desc.kafka_topic);
            per_entity.insert(
                name.to_string(),
                EntitySummary {
                    sent,
                    acked,
                    failed,
                },
            );
        }
        RunSummary {
            per_entity,
            drain_residual: residual,
        }
    }
}

async fn stream_transactional(
    name: String,
    desc: EntityDescriptor,
    pool: Arc<ReferencePool>,
    encoder: Arc<dyn RecordEncoder>,
    publisher: Arc<dyn BrokerPublisher>,
    cancel: CancellationToken,
) {
    let limiter = RateLimiter::new(desc.rate_per_second);
    let mut rng = StdRng::from_entropy();
    let mut sequence: u64 = 0;
    let mut emitted: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Some(max) = desc.max_messages {
            if emitted >= max {
                break;
            }
        }

        let wait = limiter.reserve();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        sequence += 1;
        let record = match build_record(&name, &desc, sequence, &pool, &mut rng) {
            Ok(r) => r,
            Err(CoreError::EmptyPool { entity }) => {
                error!(entity = %name, parent = %entity, "master pool empty, task failing");
                return;
            }
            Err(e) => {
                warn!(entity = %name, error = %e, "record generation failed, dropping");
                continue;
            }
        };

        let key = desc
            .key_field
            .as_ref()
            .and_then(|f| record.get(f))
            .map(|v| v.render());

        let payload = match encoder.encode(&desc.kafka_topic, &record, &desc.nested_fields).await {
            Ok(p) => p,
            Err(CoreError::SchemaRegistration { .. }) | Err(CoreError::IncompatibleSchema { .. }) => {
                error!(entity = %name, "schema registration failed, task failing");
                return;
            }
            Err(e) => {
                warn!(entity = %name, error = %e, "encoding failed, dropping record");
                continue;
            }
        };

        if !publish_with_backoff(&publisher, &desc.kafka_topic, key.as_deref(), payload).await {
            continue;
        }

        pool.append(&name, &desc.id_field, record);
        emitted += 1;
    }
}

/// Retry on `QueueFull` with a bounded exponential backoff. A logical record
/// is counted as at most one failure regardless of how many attempts it
/// took: `publish` itself only touches counters on genuine submit/delivery
/// outcomes, so the final exhausted-retries case is recorded once here.
async fn publish_with_backoff(
    publisher: &Arc<dyn BrokerPublisher>,
    topic: &str,
    key: Option<&str>,
    payload: Vec<u8>,
) -> bool {
    let mut attempt = 0;
    loop {
        match publisher.publish(topic, key, payload.clone()).await {
            Ok(()) => return true,
            Err(CoreError::QueueFull) if attempt < QUEUE_FULL_MAX_RETRIES => {
                let backoff = (QUEUE_FULL_BACKOFF_BASE_MS * 2u64.pow(attempt))
                    .min(QUEUE_FULL_BACKOFF_CAP_MS);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            Err(CoreError::QueueFull) => {
                publisher.record_failure(topic);
                return false;
            }
            Err(_) => return false,
        }
    }
}
