use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{LockRow, MetaEntry, NewHostPost};
use crate::sync::{format_flag, MetaKey};

// ========== Post Metadata ==========

/// Get one metadata value.
pub async fn get_meta(pool: &SqlitePool, post_id: i64, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT meta_value FROM post_meta WHERE post_id = ? AND meta_key = ?")
            .bind(post_id)
            .bind(key)
            .fetch_optional(pool)
            .await
            .context("Failed to fetch post metadata")?;

    Ok(row.map(|(v,)| v))
}

/// Insert or overwrite one metadata value.
pub async fn set_meta(pool: &SqlitePool, post_id: i64, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO post_meta (post_id, meta_key, meta_value)
        VALUES (?, ?, ?)
        ON CONFLICT(post_id, meta_key) DO UPDATE
        SET meta_value = excluded.meta_value, updated_at = datetime('now')
        ",
    )
    .bind(post_id)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("Failed to store post metadata")?;

    Ok(())
}

/// Get every metadata entry of a post, ordered by key.
pub async fn get_post_meta_entries(pool: &SqlitePool, post_id: i64) -> Result<Vec<MetaEntry>> {
    sqlx::query_as("SELECT * FROM post_meta WHERE post_id = ? ORDER BY meta_key")
        .bind(post_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch post metadata entries")
}

/// IDs of posts that have a non-empty value for `key`.
pub async fn list_posts_with_meta(pool: &SqlitePool, key: &str) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r"
        SELECT post_id FROM post_meta
        WHERE meta_key = ? AND trim(meta_value) != ''
        ORDER BY post_id
        ",
    )
    .bind(key)
    .fetch_all(pool)
    .await
    .context("Failed to list posts by metadata key")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Write the host-owned fields of a post in one transaction.
pub async fn upsert_host_post(pool: &SqlitePool, post: &NewHostPost) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let mut fields = vec![
        (MetaKey::PostStatus, post.status.clone()),
        (
            MetaKey::NativeCommentCount,
            post.native_comment_count.to_string(),
        ),
        (
            MetaKey::PublishToDiscourse,
            format_flag(post.publish_to_discourse).to_string(),
        ),
    ];
    if let Some(permalink) = &post.permalink {
        fields.push((MetaKey::Permalink, permalink.clone()));
    }

    for (key, value) in fields {
        sqlx::query(
            r"
            INSERT INTO post_meta (post_id, meta_key, meta_value)
            VALUES (?, ?, ?)
            ON CONFLICT(post_id, meta_key) DO UPDATE
            SET meta_value = excluded.meta_value, updated_at = datetime('now')
            ",
        )
        .bind(post.post_id)
        .bind(key.as_str())
        .bind(value)
        .execute(&mut *tx)
        .await
        .context("Failed to store host post field")?;
    }

    tx.commit().await.context("Failed to commit host post")?;
    Ok(())
}

// ========== Advisory Locks ==========

/// Take `name` for `holder` unless someone else holds it.
///
/// A row acquired at or before `stale_before` is considered abandoned and is
/// taken over. Returns whether the lock is now held by `holder`.
pub async fn try_acquire_lock(
    pool: &SqlitePool,
    name: &str,
    holder: &str,
    now: i64,
    stale_before: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r"
        INSERT INTO advisory_locks (name, holder, acquired_at)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE
        SET holder = excluded.holder, acquired_at = excluded.acquired_at
        WHERE advisory_locks.acquired_at <= ?
        ",
    )
    .bind(name)
    .bind(holder)
    .bind(now)
    .bind(stale_before)
    .execute(pool)
    .await
    .context("Failed to acquire advisory lock")?;

    Ok(result.rows_affected() == 1)
}

/// Release `name` if `holder` holds it.
pub async fn release_lock(pool: &SqlitePool, name: &str, holder: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM advisory_locks WHERE name = ? AND holder = ?")
        .bind(name)
        .bind(holder)
        .execute(pool)
        .await
        .context("Failed to release advisory lock")?;

    Ok(result.rows_affected() == 1)
}

/// Get the current holder of `name`, if any.
pub async fn get_lock(pool: &SqlitePool, name: &str) -> Result<Option<LockRow>> {
    sqlx::query_as("SELECT * FROM advisory_locks WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch advisory lock")
}
