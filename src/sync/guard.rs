//! The time-windowed, lock-protected sync of a single post.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::lock::{SyncLock, SYNC_LOCK_NAME};
use super::policy::SyncPolicy;
use super::remote::fetch_topic;
use super::store::{format_flag, parse_flag, parse_int, MetaKey, MetadataStore, PostId, PostMeta};

/// Per-post override of a sync period: `(post_id, default_seconds) -> seconds`.
pub type PeriodOverride = Arc<dyn Fn(PostId, u64) -> u64 + Send + Sync>;

/// What a call to [`SyncGuard::sync`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The window has not elapsed, or no webhook is pending.
    NotDue,
    /// Another sync holds the lock.
    LockBusy,
    NotPublished,
    MissingPermalink,
    Updated { count: i64 },
    /// The request failed or the body was unusable. The window still advanced.
    FetchFailed,
    /// The body had no `posts_count`. The window still advanced.
    MissingCount,
    /// The metadata store failed part way.
    StoreFailed,
    /// The locked section panicked. The lock was still released.
    Aborted,
}

impl SyncOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotDue => "not_due",
            Self::LockBusy => "lock_busy",
            Self::NotPublished => "not_published",
            Self::MissingPermalink => "missing_permalink",
            Self::Updated { .. } => "updated",
            Self::FetchFailed => "fetch_failed",
            Self::MissingCount => "missing_count",
            Self::StoreFailed => "store_failed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the attempt reached the remote fetch.
    #[must_use]
    pub const fn reached_remote(&self) -> bool {
        matches!(
            self,
            Self::Updated { .. } | Self::FetchFailed | Self::MissingCount
        )
    }
}

/// Decides when a post is due, serialises syncs behind one advisory lock, and
/// writes the fetched count back to the post.
#[derive(Clone)]
pub struct SyncGuard {
    client: reqwest::Client,
    store: Arc<dyn MetadataStore>,
    lock: Arc<dyn SyncLock>,
    clock: Arc<dyn Clock>,
    period_override: Option<PeriodOverride>,
}

impl fmt::Debug for SyncGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncGuard")
            .field("period_override", &self.period_override.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncGuard {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        store: Arc<dyn MetadataStore>,
        lock: Arc<dyn SyncLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            store,
            lock,
            clock,
            period_override: None,
        }
    }

    /// Vary the sync window per post.
    #[must_use]
    pub fn with_period_override(
        mut self,
        f: impl Fn(PostId, u64) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.period_override = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sync window for `post_id`, in seconds.
    #[must_use]
    pub fn sync_period(&self, post_id: PostId, policy: &SyncPolicy) -> u64 {
        self.period_override.as_ref().map_or(
            policy.sync_period_seconds,
            |f| f(post_id, policy.sync_period_seconds),
        )
    }

    /// Refresh `post_id` from Discourse if it is due and nobody else is syncing.
    ///
    /// Never fails: problems are logged and show up only as metadata that was
    /// left unchanged.
    pub async fn sync(&self, post_id: PostId, policy: &SyncPolicy) -> SyncOutcome {
        let now = self.clock.now();

        match self.is_due(post_id, policy, now).await {
            Ok(true) => {}
            Ok(false) => return SyncOutcome::NotDue,
            Err(e) => {
                error!(post_id, "Failed to read sync state: {e:#}");
                return SyncOutcome::StoreFailed;
            }
        }

        match self.lock.try_acquire(SYNC_LOCK_NAME).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(post_id, "Another sync is in flight, skipping");
                return SyncOutcome::LockBusy;
            }
            Err(e) => {
                warn!(post_id, "Failed to acquire sync lock: {e:#}");
                return SyncOutcome::LockBusy;
            }
        }

        // Unwinding out of the locked section must still reach the release below.
        let locked = AssertUnwindSafe(self.sync_locked(post_id, policy, now)).catch_unwind();
        let outcome = match locked.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(post_id, "Failed to write sync result: {e:#}");
                SyncOutcome::StoreFailed
            }
            Err(_) => {
                error!(post_id, "Sync panicked while holding the lock");
                SyncOutcome::Aborted
            }
        };

        if let Err(e) = self.lock.release(SYNC_LOCK_NAME).await {
            error!(post_id, "Failed to release sync lock: {e:#}");
        }

        debug!(post_id, outcome = outcome.as_str(), "Sync finished");
        outcome
    }

    /// Mark `post_id` as changed upstream, then sync it.
    pub async fn notify(&self, post_id: PostId, policy: &SyncPolicy) -> SyncOutcome {
        if let Err(e) = self
            .store
            .set(post_id, MetaKey::SyncPending, format_flag(true))
            .await
        {
            error!(post_id, "Failed to flag post for sync: {e:#}");
            return SyncOutcome::StoreFailed;
        }
        self.sync(post_id, policy).await
    }

    // Webhook mode only looks at the pending flag; the window is ignored.
    async fn is_due(&self, post_id: PostId, policy: &SyncPolicy, now: i64) -> Result<bool> {
        if policy.webhook_mode {
            let pending = self.store.get(post_id, MetaKey::SyncPending).await?;
            return Ok(parse_flag(pending));
        }

        let last_sync = parse_int(self.store.get(post_id, MetaKey::LastSync).await?);
        let period = i64::try_from(self.sync_period(post_id, policy)).unwrap_or(i64::MAX);
        Ok(last_sync.saturating_add(period) < now)
    }

    async fn sync_locked(
        &self,
        post_id: PostId,
        policy: &SyncPolicy,
        now: i64,
    ) -> Result<SyncOutcome> {
        let meta = PostMeta::load(self.store.as_ref(), post_id).await?;

        if !meta.is_published() {
            debug!(post_id, "Post is not published, skipping sync");
            return Ok(SyncOutcome::NotPublished);
        }

        let Some(permalink) = meta.permalink else {
            debug!(post_id, "Post has no Discourse permalink, skipping sync");
            return Ok(SyncOutcome::MissingPermalink);
        };

        let outcome = match fetch_topic(&self.client, &permalink, &policy.query_string()).await {
            Ok(snapshot) => match snapshot.reply_count() {
                Some(count) => {
                    self.store
                        .set(post_id, MetaKey::CommentsCount, &count.to_string())
                        .await?;
                    self.store
                        .set(post_id, MetaKey::CommentsRaw, &snapshot.raw)
                        .await?;
                    info!(post_id, count, "Synced comment count");
                    SyncOutcome::Updated { count }
                }
                None => {
                    warn!(post_id, permalink = %permalink, "Topic response has no posts_count");
                    SyncOutcome::MissingCount
                }
            },
            Err(e) => {
                warn!(post_id, permalink = %permalink, "Failed to fetch topic: {e}");
                SyncOutcome::FetchFailed
            }
        };

        // Failed fetches also push the window forward.
        self.store
            .set(post_id, MetaKey::LastSync, &now.to_string())
            .await?;
        self.store
            .set(post_id, MetaKey::SyncPending, format_flag(false))
            .await?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::clock::ManualClock;
    use crate::sync::lock::MemoryLock;
    use crate::sync::store::MemoryStore;

    fn guard(store: Arc<MemoryStore>, lock: Arc<MemoryLock>, now: i64) -> SyncGuard {
        SyncGuard::new(
            reqwest::Client::new(),
            store,
            lock,
            Arc::new(ManualClock::new(now)),
        )
    }

    #[tokio::test]
    async fn test_not_due_within_window() {
        let store = Arc::new(MemoryStore::new());
        store.set(1, MetaKey::LastSync, "1000").await.unwrap();
        let writes = store.write_count();
        let lock = Arc::new(MemoryLock::new());

        let outcome = guard(store.clone(), lock, 1_500)
            .sync(1, &SyncPolicy::default())
            .await;

        assert_eq!(outcome, SyncOutcome::NotDue);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_window_boundary_is_exclusive() {
        let store = Arc::new(MemoryStore::new());
        store.set(1, MetaKey::LastSync, "1000").await.unwrap();
        let lock = Arc::new(MemoryLock::new());

        // last_sync + period == now is not yet due
        let outcome = guard(store, lock, 1_600)
            .sync(1, &SyncPolicy::default())
            .await;
        assert_eq!(outcome, SyncOutcome::NotDue);
    }

    #[tokio::test]
    async fn test_period_override_applies_per_post() {
        let store = Arc::new(MemoryStore::new());
        let lock = Arc::new(MemoryLock::new());
        let guard = guard(store, lock, 0)
            .with_period_override(|post_id, default| if post_id == 7 { 60 } else { default });

        let policy = SyncPolicy::default();
        assert_eq!(guard.sync_period(7, &policy), 60);
        assert_eq!(guard.sync_period(8, &policy), 600);
    }

    #[tokio::test]
    async fn test_unpublished_post_releases_lock_without_writes() {
        let store = Arc::new(MemoryStore::new());
        store.set(1, MetaKey::PostStatus, "draft").await.unwrap();
        store
            .set(1, MetaKey::Permalink, "https://forum.example.com/t/x/1")
            .await
            .unwrap();
        let writes = store.write_count();
        let lock = Arc::new(MemoryLock::new());

        let outcome = guard(store.clone(), lock.clone(), 10_000)
            .sync(1, &SyncPolicy::default())
            .await;

        assert_eq!(outcome, SyncOutcome::NotPublished);
        assert_eq!(store.write_count(), writes);
        assert!(!lock.is_held(SYNC_LOCK_NAME));
    }

    #[tokio::test]
    async fn test_lock_busy_skips() {
        let store = Arc::new(MemoryStore::new());
        store.set(1, MetaKey::PostStatus, "publish").await.unwrap();
        let before = store.snapshot(1);
        let lock = Arc::new(MemoryLock::new());
        assert!(lock.try_acquire(SYNC_LOCK_NAME).await.unwrap());

        let outcome = guard(store.clone(), lock.clone(), 10_000)
            .sync(1, &SyncPolicy::default())
            .await;

        assert_eq!(outcome, SyncOutcome::LockBusy);
        assert_eq!(store.snapshot(1), before);
        assert!(lock.is_held(SYNC_LOCK_NAME));
    }

    #[tokio::test]
    async fn test_notify_sets_pending_flag() {
        let store = Arc::new(MemoryStore::new());
        let lock = Arc::new(MemoryLock::new());
        let policy = SyncPolicy {
            webhook_mode: true,
            ..SyncPolicy::default()
        };

        // Published but no permalink: the sync aborts and the flag survives.
        store.set(1, MetaKey::PostStatus, "publish").await.unwrap();
        let outcome = guard(store.clone(), lock.clone(), 10_000)
            .notify(1, &policy)
            .await;

        assert_eq!(outcome, SyncOutcome::MissingPermalink);
        assert_eq!(
            store.get(1, MetaKey::SyncPending).await.unwrap().as_deref(),
            Some("1")
        );
        assert!(!lock.is_held(SYNC_LOCK_NAME));
    }

    #[test]
    fn test_outcome_reached_remote() {
        assert!(SyncOutcome::Updated { count: 1 }.reached_remote());
        assert!(SyncOutcome::FetchFailed.reached_remote());
        assert!(SyncOutcome::MissingCount.reached_remote());
        assert!(!SyncOutcome::MissingPermalink.reached_remote());
        assert!(!SyncOutcome::LockBusy.reached_remote());
    }
}
