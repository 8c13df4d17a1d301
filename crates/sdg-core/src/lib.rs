//! Shared data model for the synthetic data generation engine: the dynamic
//! record type, the declarative configuration schema, and the error taxonomy
//! used by `sdg-gen`, `sdg-io`, and the `sdg-cli` orchestrator.

pub mod config;
pub mod error;
pub mod value;

pub use config::{
    BrokerConfig, CorrelationConfig, Distribution, EntityDescriptor, FieldDescriptor,
    ReferenceSpec, SecurityProtocol, SourceKind, WireFormat,
};
pub use error::{CoreError, CoreResult};
pub use value::{Record, Value};
