//! The correlated generation engine: field generation, the shared reference
//! pool, per-entity record assembly, and rate limiting (spec.md §4 A-D).

pub mod entity;
pub mod field;
pub mod pool;
pub mod rate;

pub use entity::build_record;
pub use field::{generate_field, validate_faker_method, FieldContext};
pub use pool::ReferencePool;
pub use rate::RateLimiter;
