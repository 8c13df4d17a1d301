//! Error taxonomy for the generation engine (spec.md §7).
//!
//! One variant per documented failure mode; [`CoreError::exit_code`] maps
//! each to the process exit code the CLI reports on (spec.md §6).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reference pool for entity '{entity}' is empty")]
    EmptyPool { entity: String },

    #[error("entity '{entity}' has no value bound for field '{field}'")]
    MissingReference { entity: String, field: String },

    #[error("failed to generate field '{field}' of entity '{entity}': {reason}")]
    Generation {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("publish queue is full")]
    QueueFull,

    #[error("failed to register schema for subject '{subject}': {reason}")]
    SchemaRegistration { subject: String, reason: String },

    #[error("schema for subject '{subject}' is incompatible: {reason}")]
    IncompatibleSchema { subject: String, reason: String },

    #[error("failed to encode record for entity '{entity}': {reason}")]
    Encoding { entity: String, reason: String },

    #[error("failed to deliver record to topic '{topic}': {reason}")]
    Delivery { topic: String, reason: String },

    #[error("drain timed out with {residual} record(s) still in flight")]
    DrainTimeout { residual: usize },
}

impl CoreError {
    /// Process exit code this error should surface as, per spec.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Config(_) => 2,
            CoreError::EmptyPool { .. }
            | CoreError::MissingReference { .. }
            | CoreError::Generation { .. } => 1,
            CoreError::QueueFull
            | CoreError::SchemaRegistration { .. }
            | CoreError::IncompatibleSchema { .. }
            | CoreError::Encoding { .. }
            | CoreError::Delivery { .. } => 1,
            CoreError::DrainTimeout { .. } => 3,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_two() {
        let err = CoreError::Config("missing kafka_topic".into());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn drain_timeout_exits_three() {
        let err = CoreError::DrainTimeout { residual: 4 };
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains('4'));
    }
}
