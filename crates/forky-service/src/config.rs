use std::time::Duration;

/// Tunables for the service layer.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Model used when a caller does not name one (chat) and for the
    /// merge pipeline's summarization and completion calls.
    pub default_model: String,
    /// Deadline applied to every `ModelClient` call and to each streamed
    /// chunk read; expiry surfaces `ModelTimeout` and commits nothing.
    pub model_timeout: Duration,
    /// Soft deadline for acquiring a conversation lock before reporting
    /// `Busy`.
    pub lock_timeout: Duration,
    /// Bounded capacity of the chat chunk channel.
    pub chat_buffer: usize,
    /// Maximum full-text search hits returned.
    pub search_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_model: "claude-sonnet-4-5".into(),
            model_timeout: Duration::from_secs(120),
            lock_timeout: Duration::from_secs(10),
            chat_buffer: 32,
            search_limit: 25,
        }
    }
}
