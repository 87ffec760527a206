//! The [`ChatMessage`] union — what provider adapters actually see.
//!
//! Conversation history is stored as [`Node`](crate::node::Node)s; before a
//! model call it is projected into role-tagged messages. Merge nodes keep
//! their own tag so adapters can render provenance, but behave as
//! assistant turns for coalescing purposes.

use serde::{Deserialize, Serialize};

use crate::node::{AttachmentRef, Node, Role};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<AttachmentRef>,
    },
    Assistant {
        content: String,
    },
    /// An assistant turn produced by a three-way merge.
    Merge {
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into(), attachments: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant { content: content.into() }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content, .. }
            | Self::Assistant { content }
            | Self::Merge { content } => content,
        }
    }

    /// The role an adapter should send this message as. Merge turns are
    /// assistant turns on the wire.
    pub fn wire_role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } | Self::Merge { .. } => Role::Assistant,
        }
    }

    /// Project a node into a message. Returns `None` for structural nodes
    /// (the root marker and fork markers), which carry no model-visible
    /// content.
    pub fn from_node(node: &Node) -> Option<Self> {
        if node.is_fork_marker() || (node.is_root() && node.content == crate::node::ROOT_CONTENT) {
            return None;
        }
        Some(match node.role {
            Role::System => Self::System { content: node.content.clone() },
            Role::User => Self::User {
                content: node.content.clone(),
                attachments: node.attachments.clone(),
            },
            Role::Assistant if node.is_merge() => Self::Merge { content: node.content.clone() },
            Role::Assistant => Self::Assistant { content: node.content.clone() },
        })
    }
}

/// Project a linearized history into the message list a model sees:
/// structural nodes dropped, then consecutive same-wire-role messages
/// joined with a blank line.
pub fn to_model_messages(history: &[&Node]) -> Vec<ChatMessage> {
    coalesce(history.iter().filter_map(|n| ChatMessage::from_node(n)).collect())
}

/// Merge consecutive messages that share a wire role.
pub fn coalesce(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for msg in messages {
        match out.last_mut() {
            Some(prev) if prev.wire_role() == msg.wire_role() => {
                let joined = format!("{}\n\n{}", prev.content(), msg.content());
                let replacement = match prev {
                    ChatMessage::System { .. } => ChatMessage::System { content: joined },
                    ChatMessage::User { attachments, .. } => {
                        let mut merged = std::mem::take(attachments);
                        if let ChatMessage::User { attachments: more, .. } = msg {
                            merged.extend(more);
                        }
                        ChatMessage::User { content: joined, attachments: merged }
                    }
                    ChatMessage::Assistant { .. } | ChatMessage::Merge { .. } => {
                        ChatMessage::Assistant { content: joined }
                    }
                };
                *prev = replacement;
            }
            _ => out.push(msg),
        }
    }
    out
}
