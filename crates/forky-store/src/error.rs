#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Stable reason code for UI branching.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "store_error",
            Self::Serialization(_) => "store_error",
            Self::Io(_) => "store_error",
            Self::UnknownConversation(_) => "unknown_conversation",
            Self::Corrupt(_) => "corrupt_store",
        }
    }
}
