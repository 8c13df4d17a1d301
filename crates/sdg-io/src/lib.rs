//! Wire-format encoding and broker publication (spec.md §4 E-F).

pub mod encoder;
pub mod publisher;
pub mod registry;

pub use encoder::{JsonEncoder, RecordEncoder, SchemaFramedEncoder};
pub use publisher::{BrokerPublisher, DryRunPublisher, KafkaPublisher, PublisherCounters};
pub use registry::{value_subject, FakeSchemaRegistryClient, HttpSchemaRegistryClient, SchemaRegistryClient};
