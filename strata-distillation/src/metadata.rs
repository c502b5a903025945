//! Domain metadata validation against the configured [`DomainSchema`].

use std::collections::BTreeMap;

use serde_json::Value;

use strata_core::config::DomainSchema;

pub type Metadata = BTreeMap<String, Value>;

/// Check `metadata` against `schema` and return it with defaults filled in.
///
/// Rejects undeclared fields (unless the schema allows them), values of the
/// wrong kind, and required fields that are absent with no default.
pub fn validate_metadata(schema: &DomainSchema, metadata: &Metadata) -> Result<Metadata, String> {
    let mut completed = Metadata::new();
    for (name, value) in metadata {
        match schema.field(name) {
            Some(field) if !field.kind.accepts(value) => {
                return Err(format!(
                    "{}.{name}: expected {:?}, got {value}",
                    schema.name, field.kind
                ));
            }
            Some(_) => {}
            None if !schema.allow_unknown_fields => {
                return Err(format!("{}: undeclared field {name}", schema.name));
            }
            None => {}
        }
        completed.insert(name.clone(), value.clone());
    }

    for field in &schema.fields {
        if completed.contains_key(&field.name) {
            continue;
        }
        match &field.default {
            Some(default) => {
                completed.insert(field.name.clone(), default.clone());
            }
            None if field.required => {
                return Err(format!("{}: missing required field {}", schema.name, field.name));
            }
            None => {}
        }
    }
    Ok(completed)
}

/// Metadata made only of declared defaults, for documents built without
/// generation. Fails when a required field has no default.
pub fn default_metadata(schema: &DomainSchema) -> Result<Metadata, String> {
    validate_metadata(schema, &Metadata::new())
}
