//! Property-based tests for near-duplicate grouping and conflict detection.

use std::collections::HashSet;

use proptest::prelude::*;

use strata_core::models::{DocumentType, KnowledgeDocument};
use strata_synthesis::{detect_conflicts, group_near_duplicates};
use test_fixtures::builders::KnowledgeBuilder;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const PHRASES: &[&str] = &[
    "carrier delays at Rotterdam",
    "customs clears on Tuesdays",
    "reefer capacity is short",
    "invoices are due in thirty days",
];

fn arb_docs() -> impl Strategy<Value = Vec<KnowledgeDocument>> {
    prop::collection::vec((0..PHRASES.len(), any::<bool>(), 0..3usize), 0..24).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (phrase, has_vector, carrier))| {
                let builder = KnowledgeBuilder::new(&format!("kn-{i}"), DocumentType::Insight, PHRASES[phrase])
                    .meta("carrier", ["Maersk", "MSC", "CMA CGM"][carrier]);
                if has_vector {
                    builder.build()
                } else {
                    builder.embedding(None).build()
                }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn every_document_lands_in_exactly_one_group(docs in arb_docs(), threshold in 0.5f64..=1.0) {
        let groups = group_near_duplicates(&docs, threshold);
        let mut seen = HashSet::new();
        for group in &groups {
            prop_assert!(group.member_ids.contains(&group.representative_id));
            for id in &group.member_ids {
                prop_assert!(seen.insert(id.clone()), "{} grouped twice", id);
            }
        }
        prop_assert_eq!(seen.len(), docs.len());
    }

    #[test]
    fn documents_without_vectors_are_singletons(docs in arb_docs()) {
        let groups = group_near_duplicates(&docs, 0.5);
        for doc in docs.iter().filter(|d| d.embedding.is_none()) {
            let group = groups.iter().find(|g| g.member_ids.contains(&doc.id));
            prop_assert_eq!(group.map(|g| g.member_ids.len()), Some(1));
        }
    }

    #[test]
    fn conflict_exists_iff_values_differ(docs in arb_docs()) {
        let distinct: HashSet<String> = docs.iter().map(|d| d.metadata["carrier"].to_string()).collect();
        let conflicts = detect_conflicts(&docs, &["carrier".to_string()]);
        prop_assert_eq!(conflicts.is_empty(), distinct.len() < 2);
        if let Some(conflict) = conflicts.first() {
            prop_assert_eq!(conflict.values.len(), docs.len());
        }
    }
}
