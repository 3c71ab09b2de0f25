/// Settings that shape a single sync or count lookup.
///
/// Built from [`crate::config::Config::policy`]; never mutated while a sync
/// is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Whether posts may use Discourse comments at all.
    pub use_remote_comments: bool,
    /// Syncs are driven by the pending flag instead of the time window.
    pub webhook_mode: bool,
    pub sync_period_seconds: u64,
    /// Window used when counts are read from listing/archive views.
    pub listing_sync_period_seconds: u64,
    pub max_comments: u32,
    pub min_trust_level: u32,
    pub min_score: i64,
    pub min_replies: u32,
    pub bypass_trust_level_score: i64,
    pub only_show_moderator_liked: bool,
    pub api_key: String,
    pub api_username: String,
    /// Add the host's native comments to the Discourse count.
    pub show_existing_comments: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            use_remote_comments: true,
            webhook_mode: false,
            sync_period_seconds: 600,
            listing_sync_period_seconds: 86_400,
            max_comments: 5,
            min_trust_level: 1,
            min_score: 0,
            min_replies: 1,
            bypass_trust_level_score: 50,
            only_show_moderator_liked: false,
            api_key: String::new(),
            api_username: "system".to_string(),
            show_existing_comments: false,
        }
    }
}

impl SyncPolicy {
    /// Query string sent with the `wordpress.json` request.
    ///
    /// Parameter order is fixed. Credentials always come last.
    #[must_use]
    pub fn query_string(&self) -> String {
        let mut query = format!(
            "best={}&min_trust_level={}&min_score={}&min_replies={}&bypass_trust_level_score={}",
            self.max_comments,
            self.min_trust_level,
            self.min_score,
            self.min_replies,
            self.bypass_trust_level_score,
        );

        if self.only_show_moderator_liked {
            query.push_str("&only_moderator_liked=true");
        }

        query.push_str("&api_key=");
        query.push_str(&urlencoding::encode(&self.api_key));
        query.push_str("&api_username=");
        query.push_str(&urlencoding::encode(&self.api_username));

        query
    }
}
