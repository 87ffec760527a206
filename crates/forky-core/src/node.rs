//! The [`Node`] struct — the persisted unit of a conversation graph.
//!
//! Nodes are append-only: once committed, `id`, `role`, `content`,
//! `parent_ids`, and `created_at` never change. The only later mutation is
//! deletion, which rewires children onto the deleted node's parents.
//!
//! Two system payloads are structural markers rather than dialogue: the
//! root of every conversation carries [`ROOT_CONTENT`], and fork points
//! carry [`FORK_MARKER`] plus a branch name.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::{AttachmentId, NodeId};

/// Payload of the root node of every conversation.
pub const ROOT_CONTENT: &str = "Root";

/// Payload of a fork-marker node. Markers record a named branching point
/// and carry no model-visible content.
pub const FORK_MARKER: &str = "<FORK>";

/// Who produced a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Provenance of a merge node: the common ancestor, the two parents in
/// left/right order, and the conflicts detected during classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeMetadata {
    pub lca_id: NodeId,
    pub left_parent_id: NodeId,
    pub right_parent_id: NodeId,
    #[serde(default)]
    pub conflicts: Vec<crate::state::ConflictRecord>,
}

/// An opaque reference to externally stored attachment bytes. The engine
/// carries these through; resolution belongs to the provider adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: AttachmentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A single node in a conversation DAG.
///
/// `parent_ids` is ordered: index 0 is the primary (left) parent used for
/// history linearization. The root has no parents, ordinary nodes one,
/// merge nodes exactly two.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    pub content: String,
    pub parent_ids: Vec<NodeId>,
    /// RFC 3339 creation timestamp. Ties between equal timestamps are
    /// broken by id, which is time-ordered (UUIDv7).
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_metadata: Option<MergeMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
}

impl Node {
    /// Create a new root node.
    pub fn root() -> Self {
        Self::message(Role::System, ROOT_CONTENT, Vec::new())
    }

    /// Create an ordinary message node.
    pub fn message(role: Role, content: impl Into<String>, parent_ids: Vec<NodeId>) -> Self {
        Self {
            id: NodeId::new(),
            role,
            content: content.into(),
            parent_ids,
            created_at: Utc::now().to_rfc3339(),
            branch_name: None,
            merge_metadata: None,
            attachments: Vec::new(),
        }
    }

    /// Create a fork-marker node under `parent_id`.
    pub fn fork_marker(parent_id: NodeId, branch_name: impl Into<String>) -> Self {
        let mut node = Self::message(Role::System, FORK_MARKER, vec![parent_id]);
        node.branch_name = Some(branch_name.into());
        node
    }

    /// Create a merge node with two parents and provenance metadata.
    pub fn merge(content: impl Into<String>, metadata: MergeMetadata) -> Self {
        let mut node = Self::message(
            Role::Assistant,
            content,
            vec![metadata.left_parent_id.clone(), metadata.right_parent_id.clone()],
        );
        node.merge_metadata = Some(metadata);
        node
    }

    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    pub fn is_fork_marker(&self) -> bool {
        self.role == Role::System && self.content == FORK_MARKER
    }

    pub fn is_merge(&self) -> bool {
        self.merge_metadata.is_some()
    }

    /// Sort key for every "latest wins" tie-break in the engine.
    pub fn recency_key(&self) -> (&str, &str) {
        (self.created_at.as_str(), self.id.as_str())
    }
}
