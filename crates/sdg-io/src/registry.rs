//! Schema-registry client used by the SchemaFramed encoder to resolve a
//! subject to the 4-byte version ID it stamps into every envelope.

use async_trait::async_trait;
use sdg_core::CoreError;

/// Confluent-style schema registry, minimal surface the encoder needs.
#[async_trait]
pub trait SchemaRegistryClient: Send + Sync {
    /// Register `schema` under `subject` (idempotent on the registry side)
    /// and return the version ID used in the wire envelope.
    async fn register(&self, subject: &str, schema: &str) -> Result<u32, CoreError>;
}

/// Subject naming convention: `<topic>-value` (spec.md §4.E, §6).
pub fn value_subject(topic: &str) -> String {
    format!("{topic}-value")
}

/// Talks to a real Confluent-compatible schema registry over HTTP.
pub struct HttpSchemaRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSchemaRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[async_trait]
impl SchemaRegistryClient for HttpSchemaRegistryClient {
    async fn register(&self, subject: &str, schema: &str) -> Result<u32, CoreError> {
        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        let body = serde_json::json!({ "schema": schema });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::SchemaRegistration {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::IncompatibleSchema {
                subject: subject.to_string(),
                reason: format!("registry returned {status}: {text}"),
            });
        }
        let parsed: RegisterResponse =
            resp.json().await.map_err(|e| CoreError::SchemaRegistration {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parsed.id)
    }
}

/// In-memory registry for dry-run mode and tests; assigns sequential IDs and
/// never touches the network.
#[derive(Default)]
pub struct FakeSchemaRegistryClient {
    next_id: std::sync::atomic::AtomicU32,
    assigned: parking_lot::RwLock<std::collections::HashMap<String, u32>>,
}

impl FakeSchemaRegistryClient {
    pub fn new() -> Self {
        Self {
            next_id: std::sync::atomic::AtomicU32::new(1),
            assigned: parking_lot::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl SchemaRegistryClient for FakeSchemaRegistryClient {
    async fn register(&self, subject: &str, _schema: &str) -> Result<u32, CoreError> {
        if let Some(id) = self.assigned.read().get(subject) {
            return Ok(*id);
        }
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.assigned.write().insert(subject.to_string(), id);
        Ok(id)
    }
}
