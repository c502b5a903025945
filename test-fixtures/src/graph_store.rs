//! Relationship-index fake: episodes linked to their entity and topic nodes
//! in a petgraph graph.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use strata_core::errors::{StorageError, StrataResult};
use strata_core::filter::{RecordFilter, SortOrder};
use strata_core::models::{normalize_key, Episode};
use strata_core::traits::ITierStore;

#[derive(Debug, Clone)]
enum Node {
    Episode(Box<Episode>),
    Key(String),
}

#[derive(Default)]
struct Graph {
    graph: StableDiGraph<Node, ()>,
    episodes: HashMap<String, NodeIndex>,
    keys: HashMap<String, NodeIndex>,
}

impl Graph {
    fn key_node(&mut self, key: &str) -> NodeIndex {
        if let Some(idx) = self.keys.get(key) {
            return *idx;
        }
        let idx = self.graph.add_node(Node::Key(key.to_string()));
        self.keys.insert(key.to_string(), idx);
        idx
    }

    fn remove_episode(&mut self, id: &str) -> bool {
        match self.episodes.remove(id) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct GraphEpisodeStore {
    inner: Mutex<Graph>,
    fail_next_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl GraphEpisodeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Graph> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next_writes.store(n, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().episodes.contains_key(id)
    }

    /// Episode ids linked to an entity or topic key.
    pub fn episodes_for_key(&self, key: &str) -> Vec<String> {
        let g = self.lock();
        let Some(idx) = g.keys.get(&normalize_key(key)) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = g
            .graph
            .neighbors_directed(*idx, Direction::Incoming)
            .filter_map(|n| match g.graph.node_weight(n) {
                Some(Node::Episode(ep)) => Some(ep.id.clone()),
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }

    fn episodes(&self) -> Vec<Episode> {
        let g = self.lock();
        g.episodes
            .values()
            .filter_map(|idx| match g.graph.node_weight(*idx) {
                Some(Node::Episode(ep)) => Some((**ep).clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ITierStore<Episode> for GraphEpisodeStore {
    async fn store(&self, record: &Episode) -> StrataResult<String> {
        let failing = self
            .fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::WriteFailed {
                tier: "relationship_index".into(),
                id: record.id.clone(),
                reason: "injected write failure".into(),
            }
            .into());
        }

        let mut g = self.lock();
        g.remove_episode(&record.id);
        let ep_idx = g.graph.add_node(Node::Episode(Box::new(record.clone())));
        g.episodes.insert(record.id.clone(), ep_idx);
        for key in record.keys() {
            let key_idx = g.key_node(&key);
            g.graph.add_edge(ep_idx, key_idx, ());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.id.clone())
    }

    async fn retrieve(&self, id: &str) -> StrataResult<Option<Episode>> {
        let g = self.lock();
        Ok(g.episodes
            .get(id)
            .and_then(|idx| g.graph.node_weight(*idx))
            .and_then(|n| match n {
                Node::Episode(ep) => Some((**ep).clone()),
                Node::Key(_) => None,
            }))
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: usize,
        order: &SortOrder,
    ) -> StrataResult<Vec<Episode>> {
        let mut rows: Vec<(serde_json::Value, Episode)> = self
            .episodes()
            .into_iter()
            .filter_map(|ep| {
                let value = serde_json::to_value(&ep).ok()?;
                filter.matches(&value).then_some((value, ep))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| order.compare(a, b));
        Ok(rows.into_iter().take(limit).map(|(_, ep)| ep).collect())
    }

    async fn delete(&self, id: &str) -> StrataResult<bool> {
        Ok(self.lock().remove_episode(id))
    }

    fn name(&self) -> &str {
        "relationship_index"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::EpisodeBuilder;

    #[tokio::test]
    async fn links_episodes_to_keys() {
        let store = GraphEpisodeStore::new();
        let ep = EpisodeBuilder::new("s1", &["f1", "f2"])
            .entities(&["Green Tea"])
            .build();
        store.store(&ep).await.unwrap();
        assert_eq!(store.episodes_for_key("green tea"), vec![ep.id.clone()]);

        // Re-storing replaces the node instead of duplicating it.
        store.store(&ep).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.episodes_for_key("green tea").len(), 1);
    }
}
