mod lock;
mod migrations;
mod models;
mod queries;

pub use lock::SqliteLock;
pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::sync::{MetaKey, MetadataStore, PostId};

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Several processes share the lock table; writes are serialized by SQLite.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all pending migrations.
    async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for Database {
    async fn get(&self, post_id: PostId, key: MetaKey) -> Result<Option<String>> {
        get_meta(&self.pool, post_id, key.as_str()).await
    }

    async fn set(&self, post_id: PostId, key: MetaKey, value: &str) -> Result<()> {
        set_meta(&self.pool, post_id, key.as_str(), value).await
    }

    async fn posts_with_permalink(&self) -> Result<Vec<PostId>> {
        list_posts_with_meta(&self.pool, MetaKey::Permalink.as_str()).await
    }
}
