//! Serde DTOs returned across the service boundary.

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use forky_core::node::Node;
use forky_core::state::ConflictRecord;
use forky_core::{ConversationId, NodeId, Role};
use forky_graph::ConversationGraph;
use forky_store::ConversationRecord;

use crate::error::ServiceError;

/// One row of `list_conversations`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: String,
    pub created_at: String,
    pub is_active: bool,
}

impl From<ConversationRecord> for ConversationSummary {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            created_at: record.created_at,
            is_active: record.is_active,
        }
    }
}

/// One node as rendered for graph views.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub role: Role,
    pub content: String,
    pub parent_ids: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub is_current: bool,
}

/// The whole graph of one conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub current_node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_branch: Option<String>,
}

impl GraphView {
    pub(crate) fn from_graph(graph: &ConversationGraph) -> Self {
        let current = graph.current_node_id().clone();
        let nodes = graph
            .nodes_by_creation()
            .into_iter()
            .map(|node: &Node| NodeView {
                id: node.id.clone(),
                role: node.role,
                content: node.content.clone(),
                parent_ids: node.parent_ids.clone(),
                branch_name: node.branch_name.clone(),
                is_current: node.id == current,
            })
            .collect();
        Self {
            nodes,
            current_node_id: current,
            current_branch: graph.current_branch().map(str::to_string),
        }
    }
}

/// Result of `merge_branches`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeReport {
    pub new_node_id: NodeId,
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictRecord>,
    pub summarization_failed: bool,
}

/// One streamed chat event.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatChunk {
    /// A piece of assistant text.
    Delta(String),
    /// The turn committed; both new node ids are final.
    Done { user_node_id: NodeId, assistant_node_id: NodeId },
}

/// The stream returned by `chat`.
pub type ChatStream = ReceiverStream<Result<ChatChunk, ServiceError>>;
