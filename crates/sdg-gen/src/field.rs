//! Field Generator (component A): turns a single [`FieldDescriptor`] plus the
//! record being built into a [`Value`] (spec.md §3, §4.A).

use std::collections::HashMap;
use std::sync::OnceLock;

use fake::faker::address::en::{CityName, CountryCode, StreetName, ZipCode};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;
use sdg_core::{CoreError, FieldDescriptor, Record, Value};

/// Context a field is generated under: the entity's monotonic sequence
/// counter and the record built so far (for `reference`/`via` lookups).
pub struct FieldContext<'a> {
    pub entity: &'a str,
    pub field: &'a str,
    pub sequence: u64,
    pub record_so_far: &'a Record,
}

type FakerFn = fn(&mut dyn rand::RngCore) -> String;

fn faker_registry() -> &'static HashMap<&'static str, FakerFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, FakerFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m: HashMap<&'static str, FakerFn> = HashMap::new();
        m.insert("name", |rng| Name().fake_with_rng(rng));
        m.insert("email", |rng| SafeEmail().fake_with_rng(rng));
        m.insert("phone_number", |rng| PhoneNumber().fake_with_rng(rng));
        m.insert("street_name", |rng| StreetName().fake_with_rng(rng));
        m.insert("city", |rng| CityName().fake_with_rng(rng));
        m.insert("zip_code", |rng| ZipCode().fake_with_rng(rng));
        m.insert("country_code", |rng| CountryCode().fake_with_rng(rng));
        m
    })
}

/// Returns an error if `method` is not a recognized faker routine; called at
/// config-validation time so unknown methods fail before any record is built
/// (spec.md §4.A: "`faker` methods unknown to the implementation fail with
/// `ConfigError` at startup, not at record time").
pub fn validate_faker_method(method: &str) -> Result<(), CoreError> {
    if faker_registry().contains_key(method) {
        Ok(())
    } else {
        Err(CoreError::Config(format!(
            "unknown faker method '{method}'"
        )))
    }
}

/// Produce a value for `descriptor` under `ctx`, using `rng` for anything
/// non-deterministic. `reference_lookup` resolves `Reference` descriptors by
/// returning the named field from the chosen parent record, and is supplied
/// by the Entity Generator since it alone has Reference Pool access.
pub fn generate_field(
    descriptor: &FieldDescriptor,
    ctx: &FieldContext,
    rng: &mut impl Rng,
    reference_lookup: impl FnOnce(&str, &str) -> Result<Value, CoreError>,
) -> Result<Value, CoreError> {
    match descriptor {
        FieldDescriptor::Faker { method } => {
            let f = faker_registry().get(method.as_str()).ok_or_else(|| {
                CoreError::Generation {
                    entity: ctx.entity.into(),
                    field: ctx.field.into(),
                    reason: format!("unknown faker method '{method}'"),
                }
            })?;
            Ok(Value::String(f(rng)))
        }
        FieldDescriptor::String {
            format,
            initial_value,
        } => match (format, initial_value) {
            (Some(fmt), None) => render_template(fmt, ctx).map(Value::String),
            (None, Some(lit)) => Ok(Value::String(lit.clone())),
            _ => Err(CoreError::Generation {
                entity: ctx.entity.into(),
                field: ctx.field.into(),
                reason: "string field must set exactly one of format/initial_value".into(),
            }),
        },
        FieldDescriptor::Uuid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
        FieldDescriptor::Int { min, max } => {
            if min > max {
                return Err(CoreError::Generation {
                    entity: ctx.entity.into(),
                    field: ctx.field.into(),
                    reason: format!("int range [{min}, {max}] is empty"),
                });
            }
            Ok(Value::Int(rng.gen_range(*min..=*max)))
        }
        FieldDescriptor::Float { min, max } => {
            if min > max {
                return Err(CoreError::Generation {
                    entity: ctx.entity.into(),
                    field: ctx.field.into(),
                    reason: format!("float range [{min}, {max}] is empty"),
                });
            }
            Ok(Value::Float(rng.gen_range(*min..=*max)))
        }
        FieldDescriptor::Timestamp { format } => {
            if format != "iso8601" {
                return Err(CoreError::Generation {
                    entity: ctx.entity.into(),
                    field: ctx.field.into(),
                    reason: format!("unsupported timestamp format '{format}'"),
                });
            }
            Ok(Value::String(chrono::Utc::now().to_rfc3339()))
        }
        FieldDescriptor::Choice { choices } => {
            if choices.is_empty() {
                return Err(CoreError::Generation {
                    entity: ctx.entity.into(),
                    field: ctx.field.into(),
                    reason: "choice list is empty".into(),
                });
            }
            let idx = rng.gen_range(0..choices.len());
            Ok(choices[idx].clone())
        }
        FieldDescriptor::Reference { source, via } => reference_lookup(source, via),
    }
}

/// Expand `{seq:<N>d}` to the zero-padded sequence counter and `{name}` to
/// the already-bound field of that name in the record built so far.
fn render_template(fmt: &str, ctx: &FieldContext) -> Result<String, CoreError> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let close = fmt[i..].find('}').map(|off| i + off).ok_or_else(|| {
            CoreError::Generation {
                entity: ctx.entity.into(),
                field: ctx.field.into(),
                reason: format!("unterminated template token in '{fmt}'"),
            }
        })?;
        let token = &fmt[i + 1..close];
        out.push_str(&expand_token(token, ctx)?);
        while let Some((j, _)) = chars.peek() {
            if *j >= close {
                break;
            }
            chars.next();
        }
        chars.next();
    }
    Ok(out)
}

fn expand_token(token: &str, ctx: &FieldContext) -> Result<String, CoreError> {
    if let Some(width) = token.strip_prefix("seq:").and_then(|w| w.strip_suffix('d')) {
        let width: usize = width.parse().map_err(|_| CoreError::Generation {
            entity: ctx.entity.into(),
            field: ctx.field.into(),
            reason: format!("invalid sequence width in token '{{{token}}}'"),
        })?;
        return Ok(format!("{:0width$}", ctx.sequence, width = width));
    }
    ctx.record_so_far
        .get(token)
        .map(|v| v.render())
        .ok_or_else(|| CoreError::Generation {
            entity: ctx.entity.into(),
            field: ctx.field.into(),
            reason: format!("template references unbound field '{token}'"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use rand::SeedableRng;

    fn ctx<'a>(record: &'a Record) -> FieldContext<'a> {
        FieldContext {
            entity: "customers",
            field: "customer_id",
            sequence: 7,
            record_so_far: record,
        }
    }

    #[test]
    fn seq_template_zero_pads() {
        let record = IndexMap::new();
        let out = render_template("CUST_{seq:4d}", &ctx(&record)).unwrap();
        assert_eq!(out, "CUST_0007");
    }

    #[test]
    fn name_token_substitutes_bound_field() {
        let mut record = IndexMap::new();
        record.insert("region".to_string(), Value::from("us-east"));
        let out = render_template("order-{region}", &ctx(&record)).unwrap();
        assert_eq!(out, "order-us-east");
    }

    #[test]
    fn unbound_name_token_errors() {
        let record = IndexMap::new();
        let err = render_template("order-{region}", &ctx(&record)).unwrap_err();
        assert!(matches!(err, CoreError::Generation { .. }));
    }

    #[test]
    fn unknown_faker_method_rejected_at_validation() {
        assert!(validate_faker_method("not_a_real_method").is_err());
        assert!(validate_faker_method("email").is_ok());
    }

    #[test]
    fn int_field_respects_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let record = IndexMap::new();
        let descriptor = FieldDescriptor::Int { min: 10, max: 10 };
        let v = generate_field(&descriptor, &ctx(&record), &mut rng, |_, _| {
            unreachable!()
        })
        .unwrap();
        assert_eq!(v.as_i64(), Some(10));
    }
}
