//! Per-conversation async locks with a soft acquisition deadline.
//!
//! The registry hands out one `tokio::sync::Mutex` per conversation id,
//! held as `Weak` so idle entries vanish when their last user drops.
//! Operations on different conversations never contend.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use forky_core::ConversationId;

use crate::error::ServiceError;

pub(crate) type ConversationGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub(crate) struct LockRegistry {
    locks: parking_lot::Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &ConversationId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }
        if let Some(existing) = locks.get(id.as_str()).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        let _ = locks.insert(id.as_str().to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Acquire the conversation's write lock, reporting `Busy` if the
    /// deadline passes first.
    pub async fn acquire(
        &self,
        id: &ConversationId,
        deadline: Duration,
    ) -> Result<ConversationGuard, ServiceError> {
        let lock = self.lock_for(id);
        tokio::time::timeout(deadline, lock.lock_owned())
            .await
            .map_err(|_| ServiceError::Busy { conversation_id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_conversation_serializes() {
        let registry = LockRegistry::new();
        let id = ConversationId::new();

        let guard = registry.acquire(&id, Duration::from_secs(1)).await.unwrap();
        let err = registry.acquire(&id, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Busy { .. }));
        assert_eq!(err.reason_code(), "busy");

        drop(guard);
        let _ = registry.acquire(&id, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn different_conversations_do_not_contend() {
        let registry = LockRegistry::new();
        let a = ConversationId::new();
        let b = ConversationId::new();

        let _guard_a = registry.acquire(&a, Duration::from_secs(1)).await.unwrap();
        let _guard_b = registry.acquire(&b, Duration::from_millis(20)).await.unwrap();
    }

    #[tokio::test]
    async fn lock_is_reused_for_the_same_id() {
        let registry = LockRegistry::new();
        let id = ConversationId::new();
        let first = registry.lock_for(&id);
        let second = registry.lock_for(&id);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
