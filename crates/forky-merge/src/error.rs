use forky_core::ModelError;
use forky_graph::GraphError;

use crate::eligibility::MergeRejection;

/// Errors raised by the merge pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("merge ineligible: {0}")]
    Ineligible(MergeRejection),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MergeError {
    /// Stable reason code for UI branching. Ineligibility reports the
    /// named rejection reason directly.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Ineligible(reason) => reason.as_str(),
            Self::Graph(e) => e.reason_code(),
            Self::Model(e) => e.error_kind(),
        }
    }
}
