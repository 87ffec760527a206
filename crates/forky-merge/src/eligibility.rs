//! Merge eligibility: the gate in front of the pipeline.

use serde::{Deserialize, Serialize};

use forky_core::NodeId;
use forky_graph::{ConversationGraph, GraphError};

/// Why a merge was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRejection {
    CannotMergeNodeWithItself,
    CannotMergeAncestorWithDescendant,
    NoCommonAncestorFound,
}

impl MergeRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CannotMergeNodeWithItself => "cannot_merge_node_with_itself",
            Self::CannotMergeAncestorWithDescendant => "cannot_merge_ancestor_with_descendant",
            Self::NoCommonAncestorFound => "no_common_ancestor_found",
        }
    }
}

impl std::fmt::Display for MergeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an eligibility check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeEligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<MergeRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lca_id: Option<NodeId>,
}

impl MergeEligibility {
    fn rejected(reason: MergeRejection) -> Self {
        Self { eligible: false, rejection_reason: Some(reason), lca_id: None }
    }
}

/// Check whether `a` and `b` can be merged.
///
/// The nodes must be distinct, neither may be an ancestor of the other,
/// and they must share a common ancestor. The check is symmetric in its
/// verdict; only the reported `lca_id` depends on the pair, not the order.
pub fn check_eligibility(
    graph: &ConversationGraph,
    a: &NodeId,
    b: &NodeId,
) -> Result<MergeEligibility, GraphError> {
    let _ = graph.node(a)?;
    let _ = graph.node(b)?;

    if a == b {
        return Ok(MergeEligibility::rejected(MergeRejection::CannotMergeNodeWithItself));
    }
    if graph.is_ancestor(a, b)? || graph.is_ancestor(b, a)? {
        return Ok(MergeEligibility::rejected(MergeRejection::CannotMergeAncestorWithDescendant));
    }
    match graph.lca(a, b)? {
        Some(lca_id) => {
            Ok(MergeEligibility { eligible: true, rejection_reason: None, lca_id: Some(lca_id) })
        }
        None => Ok(MergeEligibility::rejected(MergeRejection::NoCommonAncestorFound)),
    }
}
