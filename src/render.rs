//! Comment markup shown in place of native comments.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use maud::html;

use crate::sync::{MetadataStore, PostId, PostMeta};

/// Renders the comment block for a post.
#[async_trait]
pub trait CommentFormatter: Send + Sync {
    /// Markup for `post_id`, or an empty string if there is nothing to show.
    async fn format(&self, post_id: PostId) -> Result<String>;
}

/// Minimal formatter: the synced count and a link to the topic.
pub struct SummaryFormatter {
    store: Arc<dyn MetadataStore>,
}

impl SummaryFormatter {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommentFormatter for SummaryFormatter {
    async fn format(&self, post_id: PostId) -> Result<String> {
        let meta = PostMeta::load(self.store.as_ref(), post_id).await?;
        let Some(permalink) = meta.permalink else {
            return Ok(String::new());
        };

        let label = match meta.comments_count {
            0 => "No replies yet".to_string(),
            1 => "1 reply".to_string(),
            n => format!("{n} replies"),
        };

        let markup = html! {
            div.discourse-comments data-post-id=(post_id) {
                p.discourse-comments-count { (label) }
                a.discourse-comments-link href=(permalink) { "Continue the discussion" }
            }
        };
        Ok(markup.into_string())
    }
}
