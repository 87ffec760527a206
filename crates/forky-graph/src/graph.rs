//! Graph construction and mutation.

use std::collections::HashMap;

use tracing::{debug, warn};

use forky_core::node::{AttachmentRef, MergeMetadata, Node, Role};
use forky_core::NodeId;

use crate::error::GraphError;

/// One conversation's DAG plus its checkout pointer.
///
/// `children` is a derived index over `parent_ids`; consumers that need a
/// deterministic child order sort by [`Node::recency_key`].
#[derive(Debug)]
pub struct ConversationGraph {
    nodes: HashMap<NodeId, Node>,
    children: HashMap<NodeId, Vec<NodeId>>,
    root_id: NodeId,
    current_node_id: NodeId,
}

impl ConversationGraph {
    /// Create a fresh conversation: a single system root, checked out.
    pub fn new() -> Self {
        let root = Node::root();
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        let _ = nodes.insert(root_id.clone(), root);
        Self {
            nodes,
            children: HashMap::new(),
            root_id: root_id.clone(),
            current_node_id: root_id,
        }
    }

    /// Rebuild a graph from persisted nodes, validating every invariant.
    pub fn from_nodes(nodes: Vec<Node>, current_node_id: NodeId) -> Result<Self, GraphError> {
        let mut map = HashMap::with_capacity(nodes.len());
        let mut root_id = None;
        for node in nodes {
            if node.is_root() {
                if let Some(existing) = &root_id {
                    return Err(GraphError::Corrupt(format!(
                        "multiple roots: {existing} and {}",
                        node.id
                    )));
                }
                root_id = Some(node.id.clone());
            }
            if map.insert(node.id.clone(), node).is_some() {
                return Err(GraphError::Corrupt("duplicate node id".into()));
            }
        }
        let root_id = root_id.ok_or_else(|| GraphError::Corrupt("no root node".into()))?;

        let mut graph =
            Self { nodes: map, children: HashMap::new(), root_id, current_node_id };
        graph.rebuild_children();
        graph.validate()?;
        Ok(graph)
    }

    // ── Accessors ─────────────────────────────────────────────────────

    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    pub fn current_node_id(&self) -> &NodeId {
        &self.current_node_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: &NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id).ok_or_else(|| GraphError::UnknownNode(id.clone()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All nodes ordered by creation (a valid topological order, since
    /// parents are always created before their children).
    pub fn nodes_by_creation(&self) -> Vec<&Node> {
        let mut all: Vec<&Node> = self.nodes.values().collect();
        all.sort_by(|a, b| a.recency_key().cmp(&b.recency_key()));
        all
    }

    /// Direct children of a node, newest first.
    pub fn children_of(&self, id: &NodeId) -> Vec<&Node> {
        let mut out: Vec<&Node> = self
            .children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        out
    }

    /// The branch name of the nearest fork marker at or above the current
    /// checkout, if the checkout is inside a named branch.
    pub fn current_branch(&self) -> Option<&str> {
        let mut cursor = self.nodes.get(&self.current_node_id)?;
        loop {
            if let Some(name) = cursor.branch_name.as_deref() {
                return Some(name);
            }
            cursor = self.nodes.get(self.primary_parent_id(cursor)?)?;
        }
    }

    // ── Mutations ─────────────────────────────────────────────────────

    /// Append a message under `parent_id` and move the checkout to it.
    pub fn append(
        &mut self,
        parent_id: &NodeId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        self.append_with_attachments(parent_id, role, content, Vec::new())
    }

    /// Append a message carrying attachment references.
    pub fn append_with_attachments(
        &mut self,
        parent_id: &NodeId,
        role: Role,
        content: impl Into<String>,
        attachments: Vec<AttachmentRef>,
    ) -> Result<NodeId, GraphError> {
        if !self.nodes.contains_key(parent_id) {
            return Err(GraphError::InvalidParent(parent_id.clone()));
        }
        let mut node = Node::message(role, content, vec![parent_id.clone()]);
        node.attachments = attachments;
        let id = node.id.clone();
        self.insert(node);
        self.current_node_id = id.clone();
        Ok(id)
    }

    /// Insert a fork marker under `from_id` and move the checkout to it.
    /// A missing branch name is auto-generated as `branch-N`.
    pub fn fork(
        &mut self,
        from_id: &NodeId,
        branch_name: Option<String>,
    ) -> Result<NodeId, GraphError> {
        if !self.nodes.contains_key(from_id) {
            return Err(GraphError::UnknownNode(from_id.clone()));
        }
        let name = branch_name.unwrap_or_else(|| {
            let count = self.nodes.values().filter(|n| n.is_fork_marker()).count();
            format!("branch-{}", count + 1)
        });
        let marker = Node::fork_marker(from_id.clone(), name.clone());
        let id = marker.id.clone();
        self.insert(marker);
        self.current_node_id = id.clone();
        debug!(branch = %name, marker = %id, "fork created");
        Ok(id)
    }

    /// Insert a merge node and move the checkout to it.
    ///
    /// Validates the metadata against the graph: both parents exist and are
    /// distinct, and the recorded LCA is an ancestor of both.
    pub fn insert_merge(
        &mut self,
        content: impl Into<String>,
        metadata: MergeMetadata,
    ) -> Result<NodeId, GraphError> {
        if metadata.left_parent_id == metadata.right_parent_id {
            return Err(GraphError::Corrupt("merge parents must be distinct".into()));
        }
        for parent in [&metadata.left_parent_id, &metadata.right_parent_id] {
            if !self.nodes.contains_key(parent) {
                return Err(GraphError::InvalidParent(parent.clone()));
            }
        }
        if !self.is_ancestor(&metadata.lca_id, &metadata.left_parent_id)?
            || !self.is_ancestor(&metadata.lca_id, &metadata.right_parent_id)?
        {
            return Err(GraphError::Corrupt(format!(
                "merge lca {} is not an ancestor of both parents",
                metadata.lca_id
            )));
        }
        let node = Node::merge(content, metadata);
        let id = node.id.clone();
        self.insert(node);
        self.current_node_id = id.clone();
        Ok(id)
    }

    /// Move the checkout to a node id or a branch name.
    ///
    /// Branch names resolve to the most recent matching fork marker, then
    /// descend to the deepest node reachable by always taking the
    /// latest-created child.
    pub fn checkout(&mut self, identifier: &str) -> Result<NodeId, GraphError> {
        let as_id = NodeId::from_raw(identifier);
        if self.nodes.contains_key(&as_id) {
            self.current_node_id = as_id.clone();
            return Ok(as_id);
        }

        let marker = self
            .nodes
            .values()
            .filter(|n| n.is_fork_marker() && n.branch_name.as_deref() == Some(identifier))
            .max_by(|a, b| a.recency_key().cmp(&b.recency_key()))
            .ok_or_else(|| GraphError::UnknownIdentifier(identifier.to_string()))?;

        let mut tip = marker.id.clone();
        while let Some(next) = self.children_of(&tip).first().map(|n| n.id.clone()) {
            tip = next;
        }
        self.current_node_id = tip.clone();
        Ok(tip)
    }

    /// Delete a node, rewiring its children onto its parents.
    ///
    /// The root is undeletable. If the deleted node is the checkout, the
    /// pointer moves to its first surviving parent; surviving descendants
    /// keep the checkout since their ancestry stays valid.
    ///
    /// The rewire runs on a scratch copy and is validated before it is
    /// committed: a deletion that would break an invariant (for example,
    /// giving a fork marker two parents) aborts with the graph untouched.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<(), GraphError> {
        let node = self.node(id)?;
        if node.is_root() {
            return Err(GraphError::CannotDeleteRoot);
        }
        let inherited = node.parent_ids.clone();
        if inherited.is_empty() {
            // Non-root with no parents cannot occur in a validated graph.
            return Err(GraphError::CannotDeleteCurrent);
        }

        let mut nodes = self.nodes.clone();
        let child_ids: Vec<NodeId> = self.children.get(id).cloned().unwrap_or_default();
        for child_id in &child_ids {
            let child = nodes
                .get_mut(child_id)
                .ok_or_else(|| GraphError::Corrupt("child index references missing node".into()))?;

            // Splice the deleted id out, substituting its parent set in
            // place, deduplicated.
            let mut rewired: Vec<NodeId> = Vec::with_capacity(child.parent_ids.len() + 1);
            for parent in &child.parent_ids {
                if parent == id {
                    for p in &inherited {
                        if !rewired.contains(p) {
                            rewired.push(p.clone());
                        }
                    }
                } else if !rewired.contains(parent) {
                    rewired.push(parent.clone());
                }
            }
            if rewired.is_empty() {
                return Err(GraphError::Corrupt("rewiring would orphan a node".into()));
            }

            if child.merge_metadata.is_some() {
                if rewired.len() == 2 {
                    // Parent order is positional, so the metadata tracks it.
                    if let Some(meta) = child.merge_metadata.as_mut() {
                        meta.left_parent_id = rewired[0].clone();
                        meta.right_parent_id = rewired[1].clone();
                    }
                } else {
                    warn!(node = %child_id, "merge parents collapsed by deletion, dropping merge metadata");
                    child.merge_metadata = None;
                }
            }
            child.parent_ids = rewired;
        }

        // Merge provenance elsewhere may record the deleted node as its
        // LCA; its first parent is still an ancestor of both sides.
        for other in nodes.values_mut() {
            if let Some(meta) = other.merge_metadata.as_mut() {
                if meta.lca_id == *id {
                    meta.lca_id = inherited[0].clone();
                }
            }
        }

        let _ = nodes.remove(id);
        let current_node_id = if self.current_node_id == *id {
            inherited[0].clone()
        } else {
            self.current_node_id.clone()
        };

        let mut candidate = Self {
            nodes,
            children: HashMap::new(),
            root_id: self.root_id.clone(),
            current_node_id,
        };
        candidate.rebuild_children();
        candidate.validate()?;
        *self = candidate;
        debug!(node = %id, children = child_ids.len(), "node deleted");
        Ok(())
    }

    // ── Validation ────────────────────────────────────────────────────

    /// Check every structural invariant. Called before any persisted save
    /// and after loading, so a violating graph is never committed.
    pub fn validate(&self) -> Result<(), GraphError> {
        let roots: Vec<&Node> = self.nodes.values().filter(|n| n.is_root()).collect();
        match roots.as_slice() {
            [only] if only.id == self.root_id => {}
            [only] => {
                return Err(GraphError::Corrupt(format!(
                    "root pointer {} does not match parentless node {}",
                    self.root_id, only.id
                )))
            }
            [] => return Err(GraphError::Corrupt("no root node".into())),
            many => {
                return Err(GraphError::Corrupt(format!("{} parentless nodes", many.len())))
            }
        }

        if !self.nodes.contains_key(&self.current_node_id) {
            return Err(GraphError::Corrupt(format!(
                "current node {} does not exist",
                self.current_node_id
            )));
        }

        for node in self.nodes.values() {
            for parent in &node.parent_ids {
                if !self.nodes.contains_key(parent) {
                    return Err(GraphError::Corrupt(format!(
                        "node {} references missing parent {parent}",
                        node.id
                    )));
                }
            }
            match (&node.merge_metadata, node.parent_ids.len()) {
                (Some(meta), 2) => {
                    if node.parent_ids[0] == node.parent_ids[1] {
                        return Err(GraphError::Corrupt(format!(
                            "merge node {} has duplicate parents",
                            node.id
                        )));
                    }
                    if !node.parent_ids.contains(&meta.left_parent_id)
                        || !node.parent_ids.contains(&meta.right_parent_id)
                    {
                        return Err(GraphError::Corrupt(format!(
                            "merge node {} metadata disagrees with parents",
                            node.id
                        )));
                    }
                }
                (Some(_), n) => {
                    return Err(GraphError::Corrupt(format!(
                        "merge node {} has {n} parents",
                        node.id
                    )))
                }
                // Non-merge nodes are created with one parent, but deleting
                // a merge node splices its parent pair into its children.
                (None, _) => {}
            }
            if node.is_fork_marker() && node.parent_ids.len() != 1 {
                return Err(GraphError::Corrupt(format!(
                    "fork marker {} must have exactly one parent",
                    node.id
                )));
            }
        }

        self.check_acyclic()?;

        // LCA provenance needs ancestry, so it runs after the cycle check.
        for node in self.nodes.values() {
            if let Some(meta) = &node.merge_metadata {
                if !self.nodes.contains_key(&meta.lca_id)
                    || !self.is_ancestor(&meta.lca_id, &meta.left_parent_id)?
                    || !self.is_ancestor(&meta.lca_id, &meta.right_parent_id)?
                {
                    return Err(GraphError::Corrupt(format!(
                        "merge node {} records an invalid lca {}",
                        node.id, meta.lca_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over parent→child edges.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut in_degree: HashMap<&NodeId, usize> =
            self.nodes.values().map(|n| (&n.id, n.parent_ids.len())).collect();
        let mut queue: Vec<&NodeId> =
            in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            if let Some(children) = self.children.get(id) {
                for child in children {
                    let degree = in_degree
                        .get_mut(child)
                        .ok_or_else(|| GraphError::Corrupt("child index out of sync".into()))?;
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(child);
                    }
                }
            }
        }
        if visited != self.nodes.len() {
            return Err(GraphError::Corrupt(format!(
                "cycle detected: {visited} of {} nodes reachable",
                self.nodes.len()
            )));
        }
        Ok(())
    }

    // ── Internal ──────────────────────────────────────────────────────

    pub(crate) fn primary_parent_id<'a>(&self, node: &'a Node) -> Option<&'a NodeId> {
        if let Some(meta) = &node.merge_metadata {
            if node.parent_ids.contains(&meta.left_parent_id) {
                // Borrow from the node, not the metadata, to keep one lifetime.
                return node.parent_ids.iter().find(|p| **p == meta.left_parent_id);
            }
        }
        node.parent_ids.first()
    }

    fn insert(&mut self, node: Node) {
        for parent in &node.parent_ids {
            self.children.entry(parent.clone()).or_default().push(node.id.clone());
        }
        let _ = self.nodes.insert(node.id.clone(), node);
    }

    fn rebuild_children(&mut self) {
        self.children.clear();
        for node in self.nodes.values() {
            for parent in &node.parent_ids {
                self.children.entry(parent.clone()).or_default().push(node.id.clone());
            }
        }
    }
}

impl Default for ConversationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> (ConversationGraph, NodeId, NodeId) {
        let mut graph = ConversationGraph::new();
        let root = graph.root_id().clone();
        let hi = graph.append(&root, Role::User, "hi").unwrap();
        let hello = graph.append(&hi, Role::Assistant, "hello").unwrap();
        (graph, hi, hello)
    }

    #[test]
    fn new_graph_has_checked_out_root() {
        let graph = ConversationGraph::new();
        assert_eq!(graph.current_node_id(), graph.root_id());
        assert_eq!(graph.len(), 1);
        graph.validate().unwrap();
    }

    #[test]
    fn append_moves_checkout() {
        let (graph, _, hello) = linear_graph();
        assert_eq!(graph.current_node_id(), &hello);
        graph.validate().unwrap();
    }

    #[test]
    fn append_to_missing_parent_is_invalid_parent() {
        let mut graph = ConversationGraph::new();
        let err = graph.append(&NodeId::from_raw("node_missing"), Role::User, "x").unwrap_err();
        assert!(matches!(err, GraphError::InvalidParent(_)));
    }

    #[test]
    fn fork_creates_named_marker() {
        let (mut graph, hi, _) = linear_graph();
        let marker = graph.fork(&hi, Some("alt".into())).unwrap();
        let node = graph.node(&marker).unwrap();
        assert!(node.is_fork_marker());
        assert_eq!(node.branch_name.as_deref(), Some("alt"));
        assert_eq!(graph.current_node_id(), &marker);
        graph.validate().unwrap();
    }

    #[test]
    fn fork_auto_generates_names() {
        let (mut graph, hi, _) = linear_graph();
        let first = graph.fork(&hi, None).unwrap();
        let second = graph.fork(&hi, None).unwrap();
        assert_eq!(graph.node(&first).unwrap().branch_name.as_deref(), Some("branch-1"));
        assert_eq!(graph.node(&second).unwrap().branch_name.as_deref(), Some("branch-2"));
    }

    #[test]
    fn checkout_by_node_id() {
        let (mut graph, hi, hello) = linear_graph();
        let landed = graph.checkout(hi.as_str()).unwrap();
        assert_eq!(landed, hi);
        assert_eq!(graph.current_node_id(), &hi);
        let landed = graph.checkout(hello.as_str()).unwrap();
        assert_eq!(landed, hello);
    }

    #[test]
    fn checkout_by_branch_name_lands_on_deepest_child() {
        let (mut graph, _, hello) = linear_graph();
        let root = graph.root_id().clone();
        let marker = graph.fork(&root, Some("alt".into())).unwrap();
        let other = graph.append(&marker, Role::User, "other").unwrap();
        let reply = graph.append(&other, Role::Assistant, "reply").unwrap();

        let _ = graph.checkout(hello.as_str()).unwrap();
        let landed = graph.checkout("alt").unwrap();
        assert_eq!(landed, reply);
    }

    #[test]
    fn checkout_by_branch_name_without_descendants_lands_on_marker() {
        let (mut graph, hi, _) = linear_graph();
        let marker = graph.fork(&hi, Some("empty".into())).unwrap();
        let _ = graph.checkout(hi.as_str()).unwrap();
        assert_eq!(graph.checkout("empty").unwrap(), marker);
    }

    #[test]
    fn checkout_prefers_most_recent_marker_for_duplicate_names() {
        let (mut graph, hi, hello) = linear_graph();
        let _old = graph.fork(&hi, Some("alt".into())).unwrap();
        let new = graph.fork(&hello, Some("alt".into())).unwrap();
        assert_eq!(graph.checkout("alt").unwrap(), new);
    }

    #[test]
    fn checkout_unknown_identifier() {
        let (mut graph, ..) = linear_graph();
        let err = graph.checkout("nope").unwrap_err();
        assert!(matches!(err, GraphError::UnknownIdentifier(_)));
    }

    #[test]
    fn current_branch_walks_to_nearest_marker() {
        let (mut graph, hi, _) = linear_graph();
        assert_eq!(graph.current_branch(), None);
        let marker = graph.fork(&hi, Some("alt".into())).unwrap();
        let _ = graph.append(&marker, Role::User, "x").unwrap();
        assert_eq!(graph.current_branch(), Some("alt"));
    }

    #[test]
    fn delete_root_is_rejected() {
        let (mut graph, ..) = linear_graph();
        let root = graph.root_id().clone();
        let err = graph.delete_node(&root).unwrap_err();
        assert!(matches!(err, GraphError::CannotDeleteRoot));
    }

    #[test]
    fn delete_rewires_children_to_grandparent() {
        // root → a → b → c; delete b
        let mut graph = ConversationGraph::new();
        let root = graph.root_id().clone();
        let a = graph.append(&root, Role::User, "a").unwrap();
        let b = graph.append(&a, Role::Assistant, "b").unwrap();
        let c = graph.append(&b, Role::User, "c").unwrap();

        graph.delete_node(&b).unwrap();
        assert!(!graph.contains(&b));
        assert_eq!(graph.node(&c).unwrap().parent_ids, vec![a.clone()]);
        // Current was c (a survivor), so it stays.
        assert_eq!(graph.current_node_id(), &c);
        graph.validate().unwrap();
    }

    #[test]
    fn delete_current_moves_checkout_to_first_parent() {
        let mut graph = ConversationGraph::new();
        let root = graph.root_id().clone();
        let a = graph.append(&root, Role::User, "a").unwrap();
        let b = graph.append(&a, Role::Assistant, "b").unwrap();
        let _ = graph.checkout(b.as_str()).unwrap();

        graph.delete_node(&b).unwrap();
        assert_eq!(graph.current_node_id(), &a);
        graph.validate().unwrap();
    }

    #[test]
    fn delete_deduplicates_inherited_parents() {
        // Diamond: root → l, root → r, merge m(l, r). Deleting l makes m's
        // parents {root, r}; deleting r then collapses m to {root} and the
        // merge metadata is dropped.
        let mut graph = ConversationGraph::new();
        let root = graph.root_id().clone();
        let l = graph.append(&root, Role::User, "left").unwrap();
        let r = graph.append(&root, Role::User, "right").unwrap();
        let m = graph
            .insert_merge(
                "merged",
                MergeMetadata {
                    lca_id: root.clone(),
                    left_parent_id: l.clone(),
                    right_parent_id: r.clone(),
                    conflicts: vec![],
                },
            )
            .unwrap();

        graph.delete_node(&l).unwrap();
        assert_eq!(graph.node(&m).unwrap().parent_ids, vec![root.clone(), r.clone()]);
        graph.validate().unwrap();

        graph.delete_node(&r).unwrap();
        let merged = graph.node(&m).unwrap();
        assert_eq!(merged.parent_ids, vec![root.clone()]);
        assert!(merged.merge_metadata.is_none());
        graph.validate().unwrap();
    }

    #[test]
    fn insert_merge_rejects_bad_lca() {
        let mut graph = ConversationGraph::new();
        let root = graph.root_id().clone();
        let l = graph.append(&root, Role::User, "left").unwrap();
        let r = graph.append(&root, Role::User, "right").unwrap();
        let err = graph
            .insert_merge(
                "merged",
                MergeMetadata {
                    lca_id: l.clone(),
                    left_parent_id: l,
                    right_parent_id: r,
                    conflicts: vec![],
                },
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn from_nodes_rejects_missing_parent() {
        let graph = ConversationGraph::new();
        let mut nodes: Vec<Node> = graph.nodes().cloned().collect();
        nodes.push(Node::message(Role::User, "orphan", vec![NodeId::from_raw("node_gone")]));
        let current = graph.current_node_id().clone();
        let err = ConversationGraph::from_nodes(nodes, current).unwrap_err();
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn from_nodes_rejects_cycle() {
        let root = Node::root();
        let mut a = Node::message(Role::User, "a", vec![root.id.clone()]);
        let mut b = Node::message(Role::User, "b", vec![a.id.clone()]);
        // Manufacture a cycle a ↔ b.
        a.parent_ids = vec![b.id.clone()];
        b.parent_ids = vec![a.id.clone()];
        let current = root.id.clone();
        let err = ConversationGraph::from_nodes(vec![root, a, b], current).unwrap_err();
        assert!(matches!(err, GraphError::Corrupt(_)));
    }

    #[test]
    fn from_nodes_roundtrips_a_real_graph() {
        let (mut graph, hi, _) = linear_graph();
        let _ = graph.fork(&hi, Some("alt".into())).unwrap();
        let nodes: Vec<Node> = graph.nodes().cloned().collect();
        let rebuilt =
            ConversationGraph::from_nodes(nodes, graph.current_node_id().clone()).unwrap();
        assert_eq!(rebuilt.len(), graph.len());
        assert_eq!(rebuilt.root_id(), graph.root_id());
        assert_eq!(rebuilt.current_node_id(), graph.current_node_id());
    }
}
