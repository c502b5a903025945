//! Episode clustering over one session's unconsolidated facts.
//!
//! 1. Bucket facts into epoch-aligned windows of `time_window_hours`
//! 2. Within a window, link every pair above `similarity_threshold` (parallel)
//! 3. Connected components become clusters
//! 4. Clusters smaller than `min_cluster_size` wait, unless their oldest fact
//!    has passed `max_fact_age_hours`

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;

use strata_core::config::ConsolidationConfig;
use strata_core::models::Fact;
use strata_core::vector::cosine_similarity;

/// Facts grouped into one future episode.
#[derive(Debug, Clone, PartialEq)]
pub struct FactCluster {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Ordered by creation time, then id.
    pub facts: Vec<Fact>,
}

impl FactCluster {
    pub fn fact_ids(&self) -> Vec<String> {
        self.facts.iter().map(|f| f.id.clone()).collect()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.facts.iter().map(|f| f.created_at).min()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterPlan {
    pub ready: Vec<FactCluster>,
    pub deferred: Vec<FactCluster>,
}

#[derive(Debug, Clone)]
pub struct EpisodeClusterer {
    window: Duration,
    similarity_threshold: f64,
    min_cluster_size: usize,
    max_fact_age: Duration,
}

impl EpisodeClusterer {
    pub fn new(config: &ConsolidationConfig) -> Self {
        Self {
            window: Duration::hours(config.time_window_hours.max(1) as i64),
            similarity_threshold: config.similarity_threshold,
            min_cluster_size: config.min_cluster_size.max(1),
            max_fact_age: Duration::hours(config.max_fact_age_hours as i64),
        }
    }

    /// Start of the window containing `at`.
    pub fn window_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.window.num_seconds();
        let secs = at.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(width), 0).unwrap_or(at)
    }

    /// Partition `facts` (one session) into ready and deferred clusters.
    /// Facts without an embedding never link and form singletons.
    pub fn plan(&self, facts: &[Fact], now: DateTime<Utc>) -> ClusterPlan {
        let mut windows: BTreeMap<DateTime<Utc>, Vec<&Fact>> = BTreeMap::new();
        for fact in facts {
            windows
                .entry(self.window_start(fact.created_at))
                .or_default()
                .push(fact);
        }

        let mut plan = ClusterPlan::default();
        for (window_start, mut members) in windows {
            members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            let mut clusters: Vec<FactCluster> = self
                .components(&members)
                .into_iter()
                .map(|indices| FactCluster {
                    window_start,
                    window_end: window_start + self.window,
                    facts: indices.into_iter().map(|i| members[i].clone()).collect(),
                })
                .collect();
            clusters.sort_by(|a, b| a.oldest().cmp(&b.oldest()));

            for cluster in clusters {
                let aged = cluster
                    .oldest()
                    .is_some_and(|oldest| now - oldest >= self.max_fact_age);
                if cluster.len() >= self.min_cluster_size || aged {
                    plan.ready.push(cluster);
                } else {
                    plan.deferred.push(cluster);
                }
            }
        }
        plan
    }

    /// Connected components of the similarity graph, each sorted ascending.
    fn components(&self, facts: &[&Fact]) -> Vec<Vec<usize>> {
        let n = facts.len();
        let threshold = self.similarity_threshold;
        let edges: Vec<(usize, usize)> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                (i + 1..n).filter_map(move |j| {
                    let (Some(a), Some(b)) = (&facts[i].embedding, &facts[j].embedding) else {
                        return None;
                    };
                    (cosine_similarity(a, b) > threshold).then_some((i, j))
                })
            })
            .collect();

        let mut sets = DisjointSet::new(n);
        for (a, b) in edges {
            sets.union(a, b);
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..n {
            groups.entry(sets.find(i)).or_default().push(i);
        }
        groups.into_values().collect()
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_fixtures::builders::{base_time, FactBuilder};

    fn clusterer() -> EpisodeClusterer {
        EpisodeClusterer::new(&ConsolidationConfig::default())
    }

    fn fact(content: &str, seq: u64, offset_minutes: i64) -> Fact {
        FactBuilder::new("s1", content)
            .turn(seq)
            .at(base_time() + Duration::minutes(offset_minutes))
            .build()
    }

    #[test]
    fn windows_are_epoch_aligned() {
        let c = clusterer();
        let start = c.window_start(base_time() + Duration::hours(5));
        assert_eq!(start.timestamp() % 86_400, 0);
        assert!(start <= base_time());
    }

    #[test]
    fn similar_facts_share_a_cluster() {
        let facts = vec![
            fact("user prefers green tea in the morning", 1, 0),
            fact("user prefers green tea in the morning daily", 2, 5),
            fact("quarterly budget review is on friday", 3, 10),
        ];
        let plan = clusterer().plan(&facts, base_time() + Duration::hours(1));
        assert_eq!(plan.ready.len(), 1);
        assert_eq!(plan.ready[0].len(), 2);
        assert_eq!(plan.deferred.len(), 1);
        assert_eq!(plan.deferred[0].facts[0].id, facts[2].id);
    }

    #[test]
    fn facts_in_different_windows_never_merge() {
        let facts = vec![
            fact("user prefers green tea", 1, 0),
            fact("user prefers green tea", 2, 60 * 24),
        ];
        let plan = clusterer().plan(&facts, base_time() + Duration::hours(25));
        assert!(plan.ready.is_empty());
        assert_eq!(plan.deferred.len(), 2);
    }

    #[test]
    fn aged_singleton_is_forced() {
        let facts = vec![fact("user lives in Lisbon", 1, 0)];
        let plan = clusterer().plan(&facts, base_time() + Duration::hours(73));
        assert_eq!(plan.ready.len(), 1);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn facts_without_embeddings_stay_apart() {
        let a = FactBuilder::new("s1", "tea").turn(1).embedding(None).build();
        let b = FactBuilder::new("s1", "tea").turn(2).embedding(None).build();
        let plan = clusterer().plan(&[a, b], base_time());
        assert_eq!(plan.deferred.len(), 2);
    }

    #[test]
    fn transitive_links_join_one_component() {
        let mut sets = DisjointSet::new(4);
        sets.union(0, 1);
        sets.union(1, 2);
        assert_eq!(sets.find(0), sets.find(2));
        assert_ne!(sets.find(0), sets.find(3));
    }
}
