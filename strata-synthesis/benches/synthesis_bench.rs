//! Grouping and conflict detection over a filtered candidate set.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use strata_core::models::{DocumentType, KnowledgeDocument};
use strata_synthesis::{detect_conflicts, group_near_duplicates};
use test_fixtures::builders::KnowledgeBuilder;

const LINES: &[&str] = &[
    "Rotterdam terminal congestion adds two days",
    "Maersk books reefers a week ahead",
    "customs at Felixstowe clears on Tuesdays",
    "MSC rolls cargo when vessels are full",
];

fn candidates(n: usize) -> Vec<KnowledgeDocument> {
    (0..n)
        .map(|i| {
            KnowledgeBuilder::new(
                &format!("kn-{i}"),
                DocumentType::Insight,
                &format!("{} ({})", LINES[i % LINES.len()], i % 7),
            )
            .meta("carrier", if i % 2 == 0 { "Maersk" } else { "MSC" })
            .build()
        })
        .collect()
}

fn bench_synthesis_stages(c: &mut Criterion) {
    let docs = candidates(200);
    let fields = vec!["carrier".to_string()];

    c.bench_function("group_near_duplicates_200", |b| {
        b.iter(|| black_box(group_near_duplicates(black_box(&docs), 0.85)))
    });

    c.bench_function("detect_conflicts_200", |b| {
        b.iter(|| black_box(detect_conflicts(black_box(&docs), &fields)))
    });
}

criterion_group!(benches, bench_synthesis_stages);
criterion_main!(benches);
