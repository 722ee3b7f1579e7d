use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cluster membership: the set of node addresses (`host:port`) and which one
/// is "this" process. Deserialized from a JSON topology file at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<String>,
    pub local_node: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("topology lists node {0:?} more than once")]
    DuplicateNode(String),
    #[error("local_node {0:?} is not a member of nodes")]
    LocalNodeNotListed(String),
    #[error("topology must list at least one node")]
    Empty,
}

impl Topology {
    /// Validates uniqueness of `nodes` and that `local_node` is one of them.
    /// A duplicate peer entry is a fatal configuration error.
    pub fn new(nodes: Vec<String>, local_node: String) -> Result<Self, TopologyError> {
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }
        let mut seen = HashSet::with_capacity(nodes.len());
        for n in &nodes {
            if !seen.insert(n.clone()) {
                return Err(TopologyError::DuplicateNode(n.clone()));
            }
        }
        if !nodes.contains(&local_node) {
            return Err(TopologyError::LocalNodeNotListed(local_node));
        }
        Ok(Self { nodes, local_node })
    }

    pub fn is_local(&self, node: &str) -> bool {
        node == self.local_node
    }

    pub fn all(&self) -> &[String] {
        &self.nodes
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// `floor(N/2) + 1`.
    pub fn quorum_count(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    /// The single primary replica for `key` — `primaries_for(key, 1)[0]`.
    pub fn primary_for(&self, key: &[u8]) -> String {
        self.primaries_for(key, 1).into_iter().next().expect("topology is non-empty")
    }

    /// The `count` nodes that should hold `key`, ordered by descending rendezvous
    /// score. Deterministic across the whole cluster: every node ranks the same
    /// candidate set identically given the same `nodes`, so this requires no
    /// shared state or pre-partitioned ring (unlike a hash ring).
    pub fn primaries_for(&self, key: &[u8], count: usize) -> Vec<String> {
        let mut scored: Vec<(u64, &String)> =
            self.nodes.iter().map(|n| (rendezvous_score(n, key), n)).collect();
        // Break score ties on node name so the ranking is total, not just "almost always unique".
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().take(count.min(self.nodes.len())).map(|(_, n)| n.clone()).collect()
    }
}

fn rendezvous_score(node: &str, key: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    node.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}
