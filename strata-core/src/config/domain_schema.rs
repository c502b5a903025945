//! Domain metadata schema for distilled knowledge documents.
//!
//! The schema is configuration: a logistics deployment declares carrier and
//! lane fields, a support deployment declares product and severity fields.

use serde::{Deserialize, Serialize};

use crate::errors::{StrataError, StrataResult};

/// Value kind of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    String,
    Number,
    Bool,
    StringList,
}

impl MetadataKind {
    /// Whether a JSON value has this kind.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.as_f64().is_some_and(f64::is_finite),
            Self::Bool => value.is_boolean(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(serde_json::Value::is_string)),
        }
    }
}

/// One declared metadata field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFieldSpec {
    pub name: String,
    pub kind: MetadataKind,
    #[serde(default)]
    pub required: bool,
    /// Filled in when the field is absent.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Documents disagreeing on this field are reported as conflicts.
    #[serde(default)]
    pub conflict_sensitive: bool,
}

/// Metadata schema for one deployment domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSchema {
    pub name: String,
    pub fields: Vec<MetadataFieldSpec>,
    /// Keep undeclared fields instead of rejecting the document.
    pub allow_unknown_fields: bool,
}

impl Default for DomainSchema {
    fn default() -> Self {
        Self {
            name: "general".to_string(),
            fields: Vec::new(),
            allow_unknown_fields: true,
        }
    }
}

impl DomainSchema {
    pub fn field(&self, name: &str) -> Option<&MetadataFieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of fields whose disagreement is surfaced as a conflict.
    pub fn conflict_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.conflict_sensitive)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn validate(&self) -> StrataResult<()> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(StrataError::ConfigError(format!(
                    "domain schema {} has a field with an empty name",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StrataError::ConfigError(format!(
                    "domain schema {} declares {} twice",
                    self.name, field.name
                )));
            }
            if let Some(default) = &field.default {
                if !field.kind.accepts(default) {
                    return Err(StrataError::ConfigError(format!(
                        "default for {}.{} does not match kind {:?}",
                        self.name, field.name, field.kind
                    )));
                }
            }
        }
        Ok(())
    }
}
