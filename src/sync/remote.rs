//! Fetching topic snapshots from Discourse.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid permalink {permalink}: {source}")]
    InvalidPermalink {
        permalink: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("invalid response body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Result of a successful `wordpress.json` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTopicSnapshot {
    /// Total posts in the topic, including the opening post.
    pub posts_count: Option<i64>,
    /// Response body as received.
    pub raw: String,
}

impl RemoteTopicSnapshot {
    /// Parse a response body. Non-object JSON yields no `posts_count`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn from_body(raw: String) -> Result<Self, RemoteError> {
        let value: Value = serde_json::from_str(&raw)?;
        let posts_count = value.get("posts_count").and_then(Value::as_i64);
        Ok(Self { posts_count, raw })
    }

    /// Replies only: the opening post is not a comment. Never negative.
    #[must_use]
    pub fn reply_count(&self) -> Option<i64> {
        self.posts_count.map(|count| count.saturating_sub(1).max(0))
    }
}

/// Build `<permalink>/wordpress.json?<query>`.
///
/// # Errors
///
/// Returns an error if the result is not a valid URL.
pub fn topic_url(permalink: &str, query: &str) -> Result<Url, RemoteError> {
    let raw = format!(
        "{}/wordpress.json?{query}",
        permalink.trim().trim_end_matches('/')
    );
    Url::parse(&raw).map_err(|source| RemoteError::InvalidPermalink {
        permalink: permalink.to_string(),
        source,
    })
}

/// Fetch a topic snapshot.
///
/// # Errors
///
/// Returns an error on transport failure, a non-success status, or a body
/// that is not JSON.
pub async fn fetch_topic(
    client: &reqwest::Client,
    permalink: &str,
    query: &str,
) -> Result<RemoteTopicSnapshot, RemoteError> {
    let url = topic_url(permalink, query)?;

    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(RemoteError::Status(response.status()));
    }

    let body = response.text().await?;
    RemoteTopicSnapshot::from_body(body)
}
