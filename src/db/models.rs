use serde::{Deserialize, Serialize};

/// One metadata key of one post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetaEntry {
    pub post_id: i64,
    pub meta_key: String,
    pub meta_value: String,
    pub updated_at: String,
}

/// A held advisory lock.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LockRow {
    pub name: String,
    pub holder: String,
    pub acquired_at: i64,
}

/// Host-side fields of a post, as the CMS would write them.
#[derive(Debug, Clone)]
pub struct NewHostPost {
    pub post_id: i64,
    pub status: String,
    pub permalink: Option<String>,
    pub native_comment_count: i64,
    pub publish_to_discourse: bool,
}
