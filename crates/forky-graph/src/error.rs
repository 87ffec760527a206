use forky_core::NodeId;

/// Errors raised by graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("invalid parent: {0}")]
    InvalidParent(NodeId),

    #[error("cannot delete the root node")]
    CannotDeleteRoot,

    #[error("cannot delete the current node: no surviving parent to move to")]
    CannotDeleteCurrent,

    #[error("corrupt graph: {0}")]
    Corrupt(String),
}

impl GraphError {
    /// Stable reason code for UI branching.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownNode(_) => "unknown_node",
            Self::UnknownIdentifier(_) => "unknown_identifier",
            Self::InvalidParent(_) => "invalid_parent",
            Self::CannotDeleteRoot => "cannot_delete_root",
            Self::CannotDeleteCurrent => "cannot_delete_current",
            Self::Corrupt(_) => "corrupt_store",
        }
    }
}
