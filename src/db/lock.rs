//! Advisory lock backed by a shared SQLite table.
//!
//! Every process pointing at the same database file contends on the same
//! rows, so the lock holds across processes. A row older than `stale_after`
//! belongs to a holder that died without releasing and may be taken over.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::queries::{release_lock, try_acquire_lock};
use super::Database;
use crate::sync::SyncLock;

#[derive(Debug, Clone)]
pub struct SqliteLock {
    db: Database,
    holder: String,
    stale_after: Duration,
}

impl SqliteLock {
    /// Create a lock handle with a holder identity unique to this process.
    #[must_use]
    pub fn new(db: Database, stale_after: Duration) -> Self {
        let nonce = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self::with_holder(db, format!("{}-{nonce}", std::process::id()), stale_after)
    }

    #[must_use]
    pub fn with_holder(db: Database, holder: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            db,
            holder: holder.into(),
            stale_after,
        }
    }

    #[must_use]
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

#[async_trait]
impl SyncLock for SqliteLock {
    async fn try_acquire(&self, name: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let stale_after = i64::try_from(self.stale_after.as_secs()).unwrap_or(i64::MAX);
        try_acquire_lock(
            self.db.pool(),
            name,
            &self.holder,
            now,
            now.saturating_sub(stale_after),
        )
        .await
    }

    async fn release(&self, name: &str) -> Result<()> {
        if !release_lock(self.db.pool(), name, &self.holder).await? {
            warn!(name, holder = %self.holder, "Released a lock this holder did not own");
        }
        Ok(())
    }
}
