//! Advisory lock serialising all syncs.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Name of the single lock every sync contends on.
pub const SYNC_LOCK_NAME: &str = "discourse_sync_lock";

/// Cooperative, non-blocking named lock.
///
/// Implementations must never wait: `try_acquire` either takes the lock
/// immediately or reports that someone else holds it.
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Try to take the lock. Returns `false` if it is held elsewhere.
    async fn try_acquire(&self, name: &str) -> Result<bool>;

    /// Release a lock previously taken by this holder.
    async fn release(&self, name: &str) -> Result<()>;
}

/// In-process lock table, for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryLock {
    held: Mutex<HashSet<String>>,
}

impl MemoryLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held.
    #[must_use]
    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().map(|held| held.contains(name)).unwrap_or(false)
    }
}

#[async_trait]
impl SyncLock for MemoryLock {
    async fn try_acquire(&self, name: &str) -> Result<bool> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| anyhow!("lock table poisoned"))?;
        Ok(held.insert(name.to_string()))
    }

    async fn release(&self, name: &str) -> Result<()> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| anyhow!("lock table poisoned"))?;
        held.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_acquire_exhausted() {
        let lock = MemoryLock::new();

        assert!(lock.try_acquire(SYNC_LOCK_NAME).await.unwrap());
        assert!(!lock.try_acquire(SYNC_LOCK_NAME).await.unwrap());

        // Different name is independent
        assert!(lock.try_acquire("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_release() {
        let lock = MemoryLock::new();

        assert!(lock.try_acquire(SYNC_LOCK_NAME).await.unwrap());
        assert!(lock.is_held(SYNC_LOCK_NAME));

        lock.release(SYNC_LOCK_NAME).await.unwrap();
        assert!(!lock.is_held(SYNC_LOCK_NAME));
        assert!(lock.try_acquire(SYNC_LOCK_NAME).await.unwrap());
    }
}
