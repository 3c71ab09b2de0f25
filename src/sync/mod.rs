//! Comment-count synchronisation between CMS posts and Discourse topics.
//!
//! [`SyncGuard`] decides whether a post is due for a refresh, takes the
//! global advisory lock and writes the fetched count back to the post's
//! metadata. [`CountReconciler`] answers "how many comments does this post
//! have" by merging that stored count with the host's native count.

pub mod clock;
pub mod guard;
pub mod lock;
pub mod policy;
pub mod poller;
pub mod reconcile;
pub mod remote;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{PeriodOverride, SyncGuard, SyncOutcome};
pub use lock::{MemoryLock, SyncLock, SYNC_LOCK_NAME};
pub use policy::SyncPolicy;
pub use poller::{sync_loop, sync_once};
pub use reconcile::{CountReconciler, ViewContext};
pub use remote::{fetch_topic, RemoteError, RemoteTopicSnapshot};
pub use store::{
    format_flag, MemoryStore, MetaKey, MetadataStore, PostId, PostMeta, PostStatus,
};
