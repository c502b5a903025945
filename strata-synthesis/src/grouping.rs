//! Near-duplicate grouping of candidate documents.

use std::collections::BTreeMap;

use rayon::prelude::*;

use strata_core::models::{DocumentGroup, KnowledgeDocument};
use strata_core::vector::cosine_similarity;

/// Group documents whose embeddings reach `threshold` cosine similarity,
/// transitively. Documents without an embedding stay alone.
///
/// Each group is represented by its newest member; groups are ordered by
/// their first member's position in `docs`.
pub fn group_near_duplicates(docs: &[KnowledgeDocument], threshold: f64) -> Vec<DocumentGroup> {
    let n = docs.len();
    let edges: Vec<(usize, usize)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            (i + 1..n).filter_map(move |j| {
                let (Some(a), Some(b)) = (&docs[i].embedding, &docs[j].embedding) else {
                    return None;
                };
                (a.len() == b.len() && cosine_similarity(a, b) >= threshold).then_some((i, j))
            })
        })
        .collect();

    let mut parent: Vec<usize> = (0..n).collect();
    for (a, b) in edges {
        let (ra, rb) = (root(&mut parent, a), root(&mut parent, b));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        let r = root(&mut parent, i);
        members.entry(r).or_default().push(i);
    }

    members
        .into_values()
        .filter_map(|indices| {
            let newest = indices
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    docs[a]
                        .created_at
                        .cmp(&docs[b].created_at)
                        .then_with(|| docs[b].id.cmp(&docs[a].id))
                })?;
            Some(DocumentGroup {
                representative_id: docs[newest].id.clone(),
                member_ids: indices.iter().map(|&i| docs[i].id.clone()).collect(),
            })
        })
        .collect()
}

fn root(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}
