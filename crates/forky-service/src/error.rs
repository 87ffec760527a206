use forky_core::ModelError;
use forky_graph::GraphError;
use forky_merge::MergeError;
use forky_store::StoreError;

/// Errors surfaced by service operations.
///
/// Expected user errors (reference misses, merge ineligibility, delete
/// constraints) carry a stable [`reason_code`](Self::reason_code) for UI
/// branching; model and store errors pass through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("conversation {conversation_id} is busy")]
    Busy { conversation_id: String },
}

impl ServiceError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Graph(e) => e.reason_code(),
            Self::Store(e) => e.reason_code(),
            Self::Merge(e) => e.reason_code(),
            Self::Model(e) => e.error_kind(),
            Self::Busy { .. } => "busy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forky_core::NodeId;

    #[test]
    fn reason_codes_delegate() {
        assert_eq!(
            ServiceError::from(GraphError::UnknownNode(NodeId::from_raw("x"))).reason_code(),
            "unknown_node"
        );
        assert_eq!(
            ServiceError::from(StoreError::UnknownConversation("c".into())).reason_code(),
            "unknown_conversation"
        );
        assert_eq!(
            ServiceError::from(ModelError::Unavailable("down".into())).reason_code(),
            "model_unavailable"
        );
        assert_eq!(ServiceError::Busy { conversation_id: "conv_1".into() }.reason_code(), "busy");
    }

    #[test]
    fn busy_display_names_the_conversation() {
        let err = ServiceError::Busy { conversation_id: "conv_9".into() };
        assert_eq!(err.to_string(), "conversation conv_9 is busy");
    }
}
