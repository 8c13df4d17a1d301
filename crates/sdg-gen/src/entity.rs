//! Entity Generator (component C): assembles one complete record in the
//! three-phase order spec.md §4.C mandates (relationships, schema, derived).

use indexmap::IndexMap;
use rand::Rng;
use sdg_core::{CoreError, EntityDescriptor, Record, Value};

use crate::field::{generate_field, FieldContext};
use crate::pool::ReferencePool;

/// Split `"entity.field"` into its two parts; config validation guarantees
/// this shape for every `references`/`source` string that reaches here.
fn split_qualified(qualified: &str) -> (&str, &str) {
    qualified
        .split_once('.')
        .expect("qualified entity.field reference validated at config time")
}

/// Build one record for `entity_name` under `descriptor`, using `sequence`
/// as this attempt's monotonic counter value (already advanced by the
/// caller regardless of outcome, per invariant 4).
pub fn build_record(
    entity_name: &str,
    descriptor: &EntityDescriptor,
    sequence: u64,
    pool: &ReferencePool,
    rng: &mut impl Rng,
) -> Result<Record, CoreError> {
    let mut record: Record = IndexMap::new();

    // Phase 1: relationships.
    for (fk_field, ref_spec) in &descriptor.relationships {
        let (parent_entity, _parent_id_field) = split_qualified(&ref_spec.references);
        let id = pool.sample_id(
            parent_entity,
            ref_spec.distribution,
            ref_spec.alpha,
            ref_spec.recency_bias,
            rng,
        )?;
        record.insert(fk_field.clone(), id);
    }

    // Phase 2: schema fields not already bound by phase 1.
    for (field_name, descriptor_field) in &descriptor.schema {
        if record.contains_key(field_name) {
            continue;
        }
        let ctx = FieldContext {
            entity: entity_name,
            field: field_name,
            sequence,
            record_so_far: &record,
        };
        let value = generate_field(descriptor_field, &ctx, rng, |source, via| {
            resolve_reference(pool, &record, source, via)
        })?;
        record.insert(field_name.clone(), value);
    }

    // Phase 3: derived fields, in declaration order, evaluated after 1-2.
    for (field_name, descriptor_field) in &descriptor.derived_fields {
        let ctx = FieldContext {
            entity: entity_name,
            field: field_name,
            sequence,
            record_so_far: &record,
        };
        let value = generate_field(descriptor_field, &ctx, rng, |source, via| {
            resolve_reference(pool, &record, source, via)
        })?;
        record.insert(field_name.clone(), value);
    }

    Ok(record)
}

/// Resolve a `reference{source, via}` field descriptor: `via` names a field
/// already bound in this record holding a parent ID, `source` names the
/// `entity.field` to copy from that parent's record.
fn resolve_reference(
    pool: &ReferencePool,
    record: &Record,
    source: &str,
    via: &str,
) -> Result<Value, CoreError> {
    let (parent_entity, parent_field) = split_qualified(source);
    let parent_id = record.get(via).ok_or_else(|| CoreError::MissingReference {
        entity: parent_entity.to_string(),
        field: via.to_string(),
    })?;
    let parent_record = pool.lookup(parent_entity, parent_id, parent_field)?;
    parent_record
        .get(parent_field)
        .cloned()
        .ok_or_else(|| CoreError::MissingReference {
            entity: parent_entity.to_string(),
            field: parent_field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap as Map;
    use rand::SeedableRng;
    use sdg_core::{Distribution, FieldDescriptor, ReferenceSpec, SourceKind};

    fn customers_pool_with_five() -> ReferencePool {
        let pool = ReferencePool::new([
            ("customers".to_string(), false),
            ("orders".to_string(), true),
        ]);
        for i in 1..=5 {
            let mut r: Record = Map::new();
            r.insert("customer_id".to_string(), Value::from(format!("CUST_{i:04}")));
            pool.append("customers", "customer_id", r);
        }
        pool
    }

    fn orders_descriptor() -> EntityDescriptor {
        let mut schema = Map::new();
        schema.insert(
            "order_id".to_string(),
            FieldDescriptor::String {
                format: Some("ORDER_{seq:5d}".to_string()),
                initial_value: None,
            },
        );
        schema.insert(
            "total_amount".to_string(),
            FieldDescriptor::Float { min: 1.0, max: 1.0 },
        );
        let mut relationships = Map::new();
        relationships.insert(
            "customer_id".to_string(),
            ReferenceSpec {
                references: "customers.customer_id".to_string(),
                distribution: Distribution::Uniform,
                alpha: 1.0,
                recency_bias: false,
                max_delay_minutes: None,
            },
        );
        EntityDescriptor {
            kafka_topic: "orders".to_string(),
            id_field: "order_id".to_string(),
            key_field: None,
            source: SourceKind::Faker,
            bulk_load: false,
            count: None,
            max_messages: Some(3),
            rate_per_second: 100.0,
            track_recent: true,
            schema,
            relationships,
            derived_fields: Map::new(),
            nested_fields: Map::new(),
        }
    }

    #[test]
    fn binds_foreign_key_from_pool() {
        let pool = customers_pool_with_five();
        let descriptor = orders_descriptor();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let record = build_record("orders", &descriptor, 1, &pool, &mut rng).unwrap();
        let customer_id = record.get("customer_id").unwrap().as_str().unwrap();
        assert!(customer_id.starts_with("CUST_"));
        assert_eq!(record.get("order_id").unwrap().as_str(), Some("ORDER_00001"));
    }

    #[test]
    fn empty_pool_propagates_as_error() {
        let pool = ReferencePool::new([("customers".to_string(), false), ("orders".to_string(), false)]);
        let descriptor = orders_descriptor();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let err = build_record("orders", &descriptor, 1, &pool, &mut rng).unwrap_err();
        assert!(matches!(err, CoreError::EmptyPool { .. }));
    }

    #[test]
    fn derived_reference_field_copies_parent_value() {
        let pool = ReferencePool::new([
            ("orders".to_string(), true),
            ("payments".to_string(), false),
        ]);
        let mut order: Record = Map::new();
        order.insert("order_id".to_string(), Value::from("ORDER_00001"));
        order.insert("total_amount".to_string(), Value::Float(42.5));
        pool.append("orders", "order_id", order);

        let mut schema = Map::new();
        schema.insert(
            "payment_id".to_string(),
            FieldDescriptor::String {
                format: Some("PAY_{seq:6d}".to_string()),
                initial_value: None,
            },
        );
        let mut relationships = Map::new();
        relationships.insert(
            "order_id".to_string(),
            ReferenceSpec {
                references: "orders.order_id".to_string(),
                distribution: Distribution::Uniform,
                alpha: 1.0,
                recency_bias: true,
                max_delay_minutes: None,
            },
        );
        let mut derived_fields = Map::new();
        derived_fields.insert(
            "amount".to_string(),
            FieldDescriptor::Reference {
                source: "orders.total_amount".to_string(),
                via: "order_id".to_string(),
            },
        );
        let descriptor = EntityDescriptor {
            kafka_topic: "payments".to_string(),
            id_field: "payment_id".to_string(),
            key_field: None,
            source: SourceKind::Faker,
            bulk_load: false,
            count: None,
            max_messages: Some(2),
            rate_per_second: 100.0,
            track_recent: false,
            schema,
            relationships,
            derived_fields,
            nested_fields: Map::new(),
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let record = build_record("payments", &descriptor, 1, &pool, &mut rng).unwrap();
        assert_eq!(record.get("amount").unwrap().as_f64(), Some(42.5));
    }
}
