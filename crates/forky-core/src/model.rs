//! The [`ModelClient`] capability — the engine's only view of an LLM
//! provider.
//!
//! Adapters (HTTP providers, local runtimes) live outside this workspace;
//! the engine requires just completion, streaming, and model listing.
//! Every call is a suspension point and carries a caller-supplied deadline
//! enforced at the service layer.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::messages::ChatMessage;

/// A stream of assistant text chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// A model advertised by a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Provider failures, named so callers can branch without string matching.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model error: {0}")]
    Provider(String),

    #[error("model timed out after {0:?}")]
    Timeout(Duration),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

impl ModelError {
    /// Short classification string for logging and UI branching.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Provider(_) => "model_error",
            Self::Timeout(_) => "model_timeout",
            Self::Unavailable(_) => "model_unavailable",
        }
    }
}

/// Capability trait implemented by provider adapters.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run a completion and return the full assistant text.
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ModelError>;

    /// Run a completion and stream assistant text chunks as they arrive.
    async fn stream(&self, messages: &[ChatMessage], model: &str)
        -> Result<ChunkStream, ModelError>;

    /// List the models this client can serve.
    async fn available_models(&self) -> Result<Vec<ModelInfo>, ModelError>;
}
