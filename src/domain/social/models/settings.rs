//! Per-user posting preferences

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

const MAX_HASHTAG_LIMIT: i32 = 10;

/// RFC 3986 unreserved characters pass through
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PostingSettings {
    pub user_id: i64,
    pub default_account_id: Option<i64>,
    pub include_hashtags: bool,
    pub max_hashtags: i32,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub updated_at: DateTime<Utc>,
}

impl PostingSettings {
    /// Settings used for users that never saved any
    pub fn defaults_for(user_id: i64) -> Self {
        Self {
            user_id,
            default_account_id: None,
            include_hashtags: true,
            max_hashtags: 5,
            utm_source: "linkedin".to_string(),
            utm_medium: "social".to_string(),
            utm_campaign: "linkedin_autopost".to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn hashtag_limit(&self) -> usize {
        if !self.include_hashtags {
            return 0;
        }
        self.max_hashtags.clamp(0, MAX_HASHTAG_LIMIT) as usize
    }

    /// Canonical outbound URL carrying the UTM parameters
    pub fn tracking_url(&self, base_url: &str) -> String {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}utm_source={}&utm_medium={}&utm_campaign={}",
            base_url,
            separator,
            utf8_percent_encode(&self.utm_source, QUERY_VALUE),
            utf8_percent_encode(&self.utm_medium, QUERY_VALUE),
            utf8_percent_encode(&self.utm_campaign, QUERY_VALUE),
        )
    }
}
