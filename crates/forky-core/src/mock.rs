//! Scripted [`ModelClient`] for deterministic testing without API calls.
//!
//! Replies are consumed in order; requests are recorded so tests can
//! assert on the prompts the engine actually built.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use crate::messages::ChatMessage;
use crate::model::{ChunkStream, ModelClient, ModelError, ModelInfo};

/// One pre-programmed reply.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Return this text (streamed as a single chunk).
    Text(String),
    /// Stream these chunks, then end.
    Chunks(Vec<String>),
    /// Fail the call itself.
    Error(ModelError),
    /// Stream these chunks, then fail mid-stream.
    ChunksThenError(Vec<String>, ModelError),
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Convenience: a reply carrying a JSON value, for summarizer stubs.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }
}

/// Mock client returning scripted replies in sequence.
#[derive(Default)]
pub struct MockModelClient {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    calls: AtomicUsize,
}

impl MockModelClient {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue another reply after construction.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    /// Number of completed `complete`/`stream` calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Message lists seen so far, in call order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    fn take_reply(&self, messages: &[ChatMessage]) -> Result<MockReply, ModelError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(messages.to_vec());
        self.replies.lock().pop_front().ok_or_else(|| {
            ModelError::Provider(format!("MockModelClient: no reply configured for call {call}"))
        })
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, messages: &[ChatMessage], _model: &str) -> Result<String, ModelError> {
        match self.take_reply(messages)? {
            MockReply::Text(text) => Ok(text),
            MockReply::Chunks(chunks) => Ok(chunks.concat()),
            MockReply::Error(err) | MockReply::ChunksThenError(_, err) => Err(err),
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        _model: &str,
    ) -> Result<ChunkStream, ModelError> {
        match self.take_reply(messages)? {
            MockReply::Text(text) => Ok(Box::pin(stream::iter(vec![Ok(text)]))),
            MockReply::Chunks(chunks) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok).collect::<Vec<_>>())))
            }
            MockReply::Error(err) => Err(err),
            MockReply::ChunksThenError(chunks, err) => {
                let mut items: Vec<Result<String, ModelError>> =
                    chunks.into_iter().map(Ok).collect();
                items.push(Err(err));
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }

    async fn available_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        Ok(vec![ModelInfo { id: "mock-model".into(), name: "Mock Model".into() }])
    }
}
