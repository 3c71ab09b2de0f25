//! Merging the synced Discourse count with the host's own comment count.

use std::sync::Arc;

use serde::Deserialize;
use tracing::error;

use super::guard::{PeriodOverride, SyncGuard, SyncOutcome};
use super::policy::SyncPolicy;
use super::store::{PostId, PostMeta};

/// Where the count is being displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewContext {
    /// A single post page. Syncs before reading.
    Single,
    /// An index, archive or other list of posts. Syncs on the longer listing window.
    Listing,
    #[default]
    Other,
}

/// Answers comment-count lookups for posts.
#[derive(Clone)]
pub struct CountReconciler {
    guard: SyncGuard,
    policy: Arc<SyncPolicy>,
    listing_override: Option<PeriodOverride>,
}

impl CountReconciler {
    #[must_use]
    pub fn new(guard: SyncGuard, policy: Arc<SyncPolicy>) -> Self {
        Self {
            guard,
            policy,
            listing_override: None,
        }
    }

    /// Vary the listing window per post.
    #[must_use]
    pub fn with_listing_period_override(
        mut self,
        f: impl Fn(PostId, u64) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.listing_override = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn listing_period(&self, post_id: PostId) -> u64 {
        let default = self.policy.listing_sync_period_seconds;
        self.listing_override
            .as_ref()
            .map_or(default, |f| f(post_id, default))
    }

    /// Comment count to show for `post_id`.
    ///
    /// Posts not using Discourse comments get their native count. Otherwise the
    /// synced count, plus the native count when existing comments are shown.
    /// A store failure reads as zero.
    pub async fn resolve_count(&self, post_id: PostId, context: ViewContext) -> i64 {
        let meta = match PostMeta::load(self.guard.store().as_ref(), post_id).await {
            Ok(meta) => meta,
            Err(e) => {
                error!(post_id, "Failed to load post metadata: {e:#}");
                return 0;
            }
        };

        if !self.policy.use_remote_comments || !meta.publish_to_discourse {
            return meta.native_comment_count;
        }

        let mut remote_count = meta.comments_count;
        if !self.policy.webhook_mode {
            let outcome = match context {
                ViewContext::Single => Some(self.guard.sync(post_id, &self.policy).await),
                ViewContext::Listing if self.listing_window_elapsed(post_id, meta.last_sync) => {
                    Some(self.guard.sync(post_id, &self.policy).await)
                }
                ViewContext::Listing | ViewContext::Other => None,
            };
            if let Some(SyncOutcome::Updated { count }) = outcome {
                remote_count = count;
            }
        }

        if self.policy.show_existing_comments {
            remote_count.saturating_add(meta.native_comment_count)
        } else {
            remote_count
        }
    }

    fn listing_window_elapsed(&self, post_id: PostId, last_sync: i64) -> bool {
        let period = i64::try_from(self.listing_period(post_id)).unwrap_or(i64::MAX);
        last_sync.saturating_add(period) < self.guard.clock().now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::clock::ManualClock;
    use crate::sync::lock::MemoryLock;
    use crate::sync::store::{MemoryStore, MetaKey, MetadataStore};

    async fn reconciler(policy: SyncPolicy) -> (CountReconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.set(1, MetaKey::PublishToDiscourse, "1").await.unwrap();
        store.set(1, MetaKey::CommentsCount, "4").await.unwrap();
        store.set(1, MetaKey::NativeCommentCount, "2").await.unwrap();
        // Recently synced so no remote call is attempted.
        store.set(1, MetaKey::LastSync, "1000").await.unwrap();

        let guard = SyncGuard::new(
            reqwest::Client::new(),
            store.clone(),
            Arc::new(MemoryLock::new()),
            Arc::new(ManualClock::new(1_100)),
        );
        (CountReconciler::new(guard, Arc::new(policy)), store)
    }

    #[tokio::test]
    async fn test_remote_count_only() {
        let (reconciler, _store) = reconciler(SyncPolicy::default()).await;
        assert_eq!(reconciler.resolve_count(1, ViewContext::Single).await, 4);
    }

    #[tokio::test]
    async fn test_adds_existing_comments() {
        let policy = SyncPolicy {
            show_existing_comments: true,
            ..SyncPolicy::default()
        };
        let (reconciler, _store) = reconciler(policy).await;
        assert_eq!(reconciler.resolve_count(1, ViewContext::Single).await, 6);
    }

    #[tokio::test]
    async fn test_existing_comments_saturate() {
        let policy = SyncPolicy {
            show_existing_comments: true,
            ..SyncPolicy::default()
        };
        let (reconciler, store) = reconciler(policy).await;
        store
            .set(1, MetaKey::CommentsCount, &i64::MAX.to_string())
            .await
            .unwrap();
        assert_eq!(reconciler.resolve_count(1, ViewContext::Single).await, i64::MAX);
    }

    #[tokio::test]
    async fn test_native_count_when_remote_disabled() {
        let policy = SyncPolicy {
            use_remote_comments: false,
            ..SyncPolicy::default()
        };
        let (reconciler, _store) = reconciler(policy).await;
        assert_eq!(reconciler.resolve_count(1, ViewContext::Single).await, 2);
    }

    #[tokio::test]
    async fn test_native_count_for_unpublished_to_discourse() {
        let (reconciler, store) = reconciler(SyncPolicy::default()).await;
        store.set(1, MetaKey::PublishToDiscourse, "0").await.unwrap();
        assert_eq!(reconciler.resolve_count(1, ViewContext::Other).await, 2);
    }

    #[tokio::test]
    async fn test_listing_period_override() {
        let (reconciler, _store) = reconciler(SyncPolicy::default()).await;
        assert_eq!(reconciler.listing_period(1), 86_400);

        let reconciler = reconciler.with_listing_period_override(|_, _| 3_600);
        assert_eq!(reconciler.listing_period(1), 3_600);
    }
}
