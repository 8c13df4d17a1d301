//! Declarative configuration schema: entity descriptors, field descriptors,
//! reference specs, and the broker connection document (spec.md §3, §6).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Top-level configuration: a mapping of entity name to descriptor, split into
/// the master (bulk-loaded) and transactional (rate-driven) sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub master_data: IndexMap<String, EntityDescriptor>,
    #[serde(default)]
    pub transactional_data: IndexMap<String, EntityDescriptor>,
}

impl CorrelationConfig {
    /// Iterate every declared entity regardless of section, in declaration order
    /// (masters first, matching the order they must be loaded in).
    pub fn all_entities(&self) -> impl Iterator<Item = (&str, &EntityDescriptor)> {
        self.master_data
            .iter()
            .chain(self.transactional_data.iter())
            .map(|(name, desc)| (name.as_str(), desc))
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.master_data
            .get(name)
            .or_else(|| self.transactional_data.get(name))
    }
}

/// A named record stream: topic, rate, schema, and how it resolves foreign keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub kafka_topic: String,
    pub id_field: String,
    #[serde(default)]
    pub key_field: Option<String>,
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default)]
    pub bulk_load: bool,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub max_messages: Option<u64>,
    /// Records per second; `0` means unbounded (spec.md §3).
    #[serde(default)]
    pub rate_per_second: f64,
    #[serde(default)]
    pub track_recent: bool,
    #[serde(default)]
    pub schema: IndexMap<String, FieldDescriptor>,
    #[serde(default)]
    pub relationships: IndexMap<String, ReferenceSpec>,
    #[serde(default)]
    pub derived_fields: IndexMap<String, FieldDescriptor>,
    /// Field names promoted into a single nested sub-message before binary
    /// encoding (§4.E); unused for JSON output.
    #[serde(default)]
    pub nested_fields: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Faker,
    Csv,
    Generator,
}

/// A field descriptor, tagged by `type` per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDescriptor {
    /// Invoke a named realistic-data routine (e.g. `name`, `email`).
    Faker { method: String },
    /// Either a `{seq:NNd}`/`{name}` template (`format`) or a literal constant
    /// (`initial_value`) — exactly one must be set; Init validates this.
    String {
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        initial_value: Option<String>,
    },
    Uuid,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    /// Current wall-clock time formatted; only `format: "iso8601"` is required.
    Timestamp { format: String },
    Choice { choices: Vec<Value> },
    /// Look up the parent record keyed by the value already bound to `via` and
    /// copy `source`'s named field.
    Reference { source: String, via: String },
}

/// How a foreign key is resolved against a parent entity's Reference Pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// `"<entity>.<id_field>"`.
    pub references: String,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub recency_bias: bool,
    /// Carried for observability only; not used in selection math (spec.md §3).
    #[serde(default)]
    pub max_delay_minutes: Option<u64>,
}

fn default_alpha() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Uniform,
    Zipf,
}

/// Broker connection document (spec.md §6), loaded separately from the
/// pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(rename = "bootstrap.servers")]
    pub bootstrap_servers: String,
    #[serde(rename = "security.protocol", default)]
    pub security_protocol: SecurityProtocol,
    #[serde(rename = "sasl.mechanism", default)]
    pub sasl_mechanism: Option<String>,
    #[serde(rename = "sasl.username", default)]
    pub sasl_username: Option<String>,
    #[serde(rename = "sasl.password", default)]
    pub sasl_password: Option<String>,
    #[serde(rename = "ssl.ca.location", default)]
    pub ssl_ca_location: Option<String>,
    #[serde(rename = "ssl.certificate.location", default)]
    pub ssl_certificate_location: Option<String>,
    #[serde(rename = "ssl.key.location", default)]
    pub ssl_key_location: Option<String>,
    #[serde(rename = "schema.registry.url", default)]
    pub schema_registry_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityProtocol {
    #[default]
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
    #[serde(rename = "SSL")]
    Ssl,
    #[serde(rename = "SASL_PLAINTEXT")]
    SaslPlaintext,
    #[serde(rename = "SASL_SSL")]
    SaslSsl,
}

/// Output wire format selected on the control surface (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    Json,
    Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_entity() {
        let yaml = r#"
kafka_topic: customers
id_field: customer_id
bulk_load: true
count: 5
schema:
  customer_id:
    type: string
    format: "CUST_{seq:4d}"
  name:
    type: faker
    method: name
"#;
        let desc: EntityDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.kafka_topic, "customers");
        assert!(desc.bulk_load);
        assert_eq!(desc.count, Some(5));
        assert_eq!(desc.schema.len(), 2);
    }

    #[test]
    fn parses_reference_with_defaults() {
        let yaml = r#"
references: customers.customer_id
"#;
        let spec: ReferenceSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.distribution, Distribution::Uniform);
        assert_eq!(spec.alpha, 1.0);
        assert!(!spec.recency_bias);
    }
}
