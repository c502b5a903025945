//! Structured output of the distillation call.
//!
//! One call yields every configured document type. The response is rejected
//! as a whole when a type is missing or unexpected, content is blank, or any
//! document's metadata fails the domain schema.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{json, Value};

use strata_core::config::DomainSchema;
use strata_core::models::DocumentType;

use crate::metadata::validate_metadata;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistillationOutput {
    pub documents: Vec<DistilledDocument>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistilledDocument {
    pub document_type: DocumentType,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DistillationOutput {
    pub fn validate(&self, expected: &[DocumentType], schema: &DomainSchema) -> Result<(), String> {
        let wanted: BTreeSet<DocumentType> = expected.iter().copied().collect();
        let mut produced = BTreeSet::new();
        for (i, doc) in self.documents.iter().enumerate() {
            if !wanted.contains(&doc.document_type) {
                return Err(format!(
                    "document {i}: type {} was not requested",
                    doc.document_type.as_str()
                ));
            }
            if doc.content.trim().is_empty() {
                return Err(format!("document {i}: empty content"));
            }
            validate_metadata(schema, &doc.metadata).map_err(|e| format!("document {i}: {e}"))?;
            produced.insert(doc.document_type);
        }
        if let Some(missing) = wanted.difference(&produced).next() {
            return Err(format!("no {} document produced", missing.as_str()));
        }
        Ok(())
    }
}

/// JSON schema sent with the request. Metadata properties mirror the domain.
pub fn distillation_schema(types: &[DocumentType], schema: &DomainSchema) -> Value {
    let type_names: Vec<&str> = types.iter().map(DocumentType::as_str).collect();
    let properties: serde_json::Map<String, Value> = schema
        .fields
        .iter()
        .map(|f| {
            let kind = serde_json::to_value(f.kind).unwrap_or(Value::Null);
            (f.name.clone(), json!({ "kind": kind }))
        })
        .collect();
    let required: Vec<&str> = schema
        .fields
        .iter()
        .filter(|f| f.required && f.default.is_none())
        .map(|f| f.name.as_str())
        .collect();
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["documents"],
        "properties": {
            "documents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["document_type", "content"],
                    "properties": {
                        "document_type": { "enum": type_names },
                        "content": { "type": "string", "minLength": 1 },
                        "metadata": {
                            "type": "object",
                            "additionalProperties": schema.allow_unknown_fields,
                            "required": required,
                            "properties": properties
                        }
                    }
                }
            }
        }
    })
}
