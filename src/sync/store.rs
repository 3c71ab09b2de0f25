//! Post metadata: the keys this service reads and writes, and the store they live in.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Opaque identifier of a host post.
pub type PostId = i64;

/// Metadata keys stored per post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaKey {
    Permalink,
    LastSync,
    CommentsCount,
    CommentsRaw,
    /// Stored as `sync_pending_flag`.
    SyncPending,
    /// Maintained by the host.
    NativeCommentCount,
    /// Maintained by the host.
    PostStatus,
    /// Maintained by the host.
    PublishToDiscourse,
}

impl MetaKey {
    pub const ALL: [Self; 8] = [
        Self::Permalink,
        Self::LastSync,
        Self::CommentsCount,
        Self::CommentsRaw,
        Self::SyncPending,
        Self::NativeCommentCount,
        Self::PostStatus,
        Self::PublishToDiscourse,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Permalink => "discourse_permalink",
            Self::LastSync => "discourse_last_sync",
            Self::CommentsCount => "discourse_comments_count",
            Self::CommentsRaw => "discourse_comments_raw",
            Self::SyncPending => "sync_pending_flag",
            Self::NativeCommentCount => "native_comment_count",
            Self::PostStatus => "post_status",
            Self::PublishToDiscourse => "publish_to_discourse",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }
}

/// Publication state of a host post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
}

impl PostStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Future => "future",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trash => "trash",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "publish" => Some(Self::Publish),
            "future" => Some(Self::Future),
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "private" => Some(Self::Private),
            "trash" => Some(Self::Trash),
            _ => None,
        }
    }
}

/// Key-value metadata backend, one bag of keys per post.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, post_id: PostId, key: MetaKey) -> Result<Option<String>>;

    async fn set(&self, post_id: PostId, key: MetaKey, value: &str) -> Result<()>;

    /// Posts that have a non-empty permalink, in ascending order.
    async fn posts_with_permalink(&self) -> Result<Vec<PostId>>;
}

/// Typed view of a post's metadata. Missing keys read as zero or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMeta {
    pub permalink: Option<String>,
    pub last_sync: i64,
    pub comments_count: i64,
    pub comments_raw: Option<String>,
    pub sync_pending: bool,
    pub native_comment_count: i64,
    pub status: Option<PostStatus>,
    pub publish_to_discourse: bool,
}

impl PostMeta {
    /// Load every key for `post_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load(store: &dyn MetadataStore, post_id: PostId) -> Result<Self> {
        let permalink = store
            .get(post_id, MetaKey::Permalink)
            .await?
            .filter(|p| !p.trim().is_empty());

        Ok(Self {
            permalink,
            last_sync: parse_int(store.get(post_id, MetaKey::LastSync).await?),
            comments_count: parse_int(store.get(post_id, MetaKey::CommentsCount).await?),
            comments_raw: store.get(post_id, MetaKey::CommentsRaw).await?,
            sync_pending: parse_flag(store.get(post_id, MetaKey::SyncPending).await?),
            native_comment_count: parse_int(
                store.get(post_id, MetaKey::NativeCommentCount).await?,
            ),
            status: store
                .get(post_id, MetaKey::PostStatus)
                .await?
                .as_deref()
                .and_then(PostStatus::from_str),
            publish_to_discourse: parse_flag(
                store.get(post_id, MetaKey::PublishToDiscourse).await?,
            ),
        })
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == Some(PostStatus::Publish)
    }
}

/// Lenient integer read: absent or malformed values count as zero.
#[must_use]
pub fn parse_int(value: Option<String>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

#[must_use]
pub fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim),
        Some("1" | "true" | "yes" | "on")
    )
}

#[must_use]
pub const fn format_flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// In-memory metadata store.
///
/// Counts every `set` call so tests can assert that nothing was written.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(PostId, MetaKey), String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// All keys stored for `post_id`, by key name.
    #[must_use]
    pub fn snapshot(&self, post_id: PostId) -> BTreeMap<&'static str, String> {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|((id, _), _)| *id == post_id)
                    .map(|((_, key), value)| (key.as_str(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, post_id: PostId, key: MetaKey) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("metadata store poisoned"))?;
        Ok(entries.get(&(post_id, key)).cloned())
    }

    async fn set(&self, post_id: PostId, key: MetaKey, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("metadata store poisoned"))?;
        entries.insert((post_id, key), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn posts_with_permalink(&self) -> Result<Vec<PostId>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("metadata store poisoned"))?;
        let mut ids: Vec<PostId> = entries
            .iter()
            .filter(|((_, key), value)| *key == MetaKey::Permalink && !value.trim().is_empty())
            .map(|((id, _), _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
