//! Ancestry and linearization queries.
//!
//! All queries are BFS with a visited set, O(|V|+|E|) worst case.
//! Conversation graphs are small (hundreds of nodes), so nothing is
//! indexed; callers that fan out over many pairs (the merge pipeline)
//! reuse the ancestor maps computed here instead of re-walking.

use std::collections::{HashMap, HashSet, VecDeque};

use forky_core::node::Node;
use forky_core::NodeId;

use crate::error::GraphError;
use crate::graph::ConversationGraph;

impl ConversationGraph {
    /// Ancestors of `id` (including `id` itself) mapped to their BFS
    /// distance from `id`.
    pub fn ancestor_distances(&self, id: &NodeId) -> Result<HashMap<NodeId, usize>, GraphError> {
        let _ = self.node(id)?;
        let mut distances: HashMap<NodeId, usize> = HashMap::new();
        let _ = distances.insert(id.clone(), 0);
        let mut queue: VecDeque<NodeId> = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            let dist = distances[&current];
            if let Some(node) = self.get(&current) {
                for parent in &node.parent_ids {
                    if !distances.contains_key(parent) {
                        let _ = distances.insert(parent.clone(), dist + 1);
                        queue.push_back(parent.clone());
                    }
                }
            }
        }
        Ok(distances)
    }

    /// The set of ancestors of `id`, including `id`.
    pub fn ancestor_set(&self, id: &NodeId) -> Result<HashSet<NodeId>, GraphError> {
        Ok(self.ancestor_distances(id)?.into_keys().collect())
    }

    /// True when `a` is an ancestor of `b` (a node is its own ancestor).
    pub fn is_ancestor(&self, a: &NodeId, b: &NodeId) -> Result<bool, GraphError> {
        let _ = self.node(a)?;
        Ok(self.ancestor_set(b)?.contains(a))
    }

    /// All descendants of `id`, including `id`.
    pub fn descendants(&self, id: &NodeId) -> Result<HashSet<NodeId>, GraphError> {
        let _ = self.node(id)?;
        let mut seen: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut queue: VecDeque<NodeId> = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(&current) {
                if seen.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                }
            }
        }
        Ok(seen)
    }

    /// Lowest common ancestor of `a` and `b`.
    ///
    /// Among the common ancestors, only those with no descendant also in
    /// the intersection qualify; ties break by highest `created_at`, then
    /// id. Returns `None` only when the nodes share no ancestor, which a
    /// connected conversation never produces but corrupted input can.
    pub fn lca(&self, a: &NodeId, b: &NodeId) -> Result<Option<NodeId>, GraphError> {
        let ancestors_a = self.ancestor_set(a)?;
        let ancestors_b = self.ancestor_set(b)?;
        let common: HashSet<NodeId> = ancestors_a.intersection(&ancestors_b).cloned().collect();
        if common.is_empty() {
            return Ok(None);
        }

        // A common ancestor is dominated if some other common ancestor
        // lies below it; only undominated candidates remain.
        let mut dominated: HashSet<NodeId> = HashSet::new();
        for id in &common {
            for ancestor in self.ancestor_set(id)? {
                if ancestor != *id && common.contains(&ancestor) {
                    let _ = dominated.insert(ancestor);
                }
            }
        }

        // Latest wins, same rule as every other recency tie-break.
        let best = common
            .iter()
            .filter(|id| !dominated.contains(*id))
            .filter_map(|id| self.get(id))
            .max_by(|x, y| x.recency_key().cmp(&y.recency_key()))
            .map(|n| n.id.clone());
        Ok(best)
    }

    /// Linearize the conversation from the root to `id`.
    ///
    /// Walks primary parents backward (the recorded left parent through
    /// merge nodes), reverses to root-first order, and filters fork
    /// markers, which are structure rather than dialogue.
    pub fn history(&self, id: &NodeId) -> Result<Vec<&Node>, GraphError> {
        let mut path: Vec<&Node> = Vec::new();
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut cursor = self.node(id)?;
        loop {
            if !seen.insert(&cursor.id) {
                return Err(GraphError::Corrupt(format!(
                    "parent cycle through {} while linearizing",
                    cursor.id
                )));
            }
            path.push(cursor);
            let Some(parent_id) = self.primary_parent_id(cursor) else {
                break;
            };
            cursor = self.node(parent_id)?;
        }
        path.reverse();
        Ok(path.into_iter().filter(|n| !n.is_fork_marker()).collect())
    }
}
