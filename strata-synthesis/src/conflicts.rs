//! Metadata disagreement between documents in scope.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use strata_core::models::{ConflictingValue, KnowledgeConflict, KnowledgeDocument};

/// Fields to compare: the schema's conflict-sensitive fields, or, when none
/// are declared, every metadata field the query did not pin.
pub fn conflict_fields(
    declared: &[&str],
    docs: &[KnowledgeDocument],
    pinned: &BTreeMap<String, Value>,
) -> Vec<String> {
    if !declared.is_empty() {
        return declared.iter().map(|f| f.to_string()).collect();
    }
    docs.iter()
        .flat_map(|d| d.metadata.keys())
        .filter(|k| !pinned.contains_key(*k))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One conflict per field on which the documents hold two or more distinct
/// values. Every document carrying the field is listed, in input order.
pub fn detect_conflicts(docs: &[KnowledgeDocument], fields: &[String]) -> Vec<KnowledgeConflict> {
    fields
        .iter()
        .filter_map(|field| {
            let values: Vec<ConflictingValue> = docs
                .iter()
                .filter_map(|d| {
                    d.metadata.get(field).filter(|v| !v.is_null()).map(|v| ConflictingValue {
                        document_id: d.id.clone(),
                        value: v.clone(),
                    })
                })
                .collect();
            let distinct: BTreeSet<String> = values.iter().map(|v| v.value.to_string()).collect();
            (distinct.len() >= 2).then(|| KnowledgeConflict {
                field: field.clone(),
                values,
            })
        })
        .collect()
}
