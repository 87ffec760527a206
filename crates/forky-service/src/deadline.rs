//! Deadline wrapper around a [`ModelClient`].
//!
//! Every provider call the service makes goes through this adapter, which
//! converts an elapsed deadline into [`ModelError::Timeout`]. Per-chunk
//! idle deadlines during streaming are enforced at the consumption site.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use forky_core::messages::ChatMessage;
use forky_core::model::{ChunkStream, ModelClient, ModelError, ModelInfo};

pub(crate) struct DeadlineModelClient {
    inner: Arc<dyn ModelClient>,
    deadline: Duration,
}

impl DeadlineModelClient {
    pub fn new(inner: Arc<dyn ModelClient>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl ModelClient for DeadlineModelClient {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ModelError> {
        timeout(self.deadline, self.inner.complete(messages, model))
            .await
            .map_err(|_| ModelError::Timeout(self.deadline))?
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<ChunkStream, ModelError> {
        timeout(self.deadline, self.inner.stream(messages, model))
            .await
            .map_err(|_| ModelError::Timeout(self.deadline))?
    }

    async fn available_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        timeout(self.deadline, self.inner.available_models())
            .await
            .map_err(|_| ModelError::Timeout(self.deadline))?
    }
}
