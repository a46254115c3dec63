//! Scheduled post model definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::account::Platform;
use super::codec::text_column;
use crate::constants::PREVIEW_CHARS;
use crate::domain::content::{ContentKind, ContentRef};

/// Post status enum
///
/// `posted` is absorbing. `failed` only leaves through an explicit retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Posting,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Posting => "posting",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PostStatus::Draft),
            "scheduled" => Some(PostStatus::Scheduled),
            "posting" => Some(PostStatus::Posting),
            "posted" => Some(PostStatus::Posted),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }

    /// Statuses that count as an active post for the same content and platform
    pub fn blocks_duplicate(&self) -> bool {
        matches!(
            self,
            PostStatus::Scheduled | PostStatus::Posting | PostStatus::Posted
        )
    }

    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed
        )
    }

    /// Edges of the post lifecycle. Retry limits are checked separately.
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        matches!(
            (self, next),
            (PostStatus::Draft, PostStatus::Scheduled)
                | (PostStatus::Draft, PostStatus::Posting)
                | (PostStatus::Scheduled, PostStatus::Posting)
                | (PostStatus::Scheduled, PostStatus::Failed)
                | (PostStatus::Posting, PostStatus::Posted)
                | (PostStatus::Posting, PostStatus::Failed)
                | (PostStatus::Failed, PostStatus::Posting)
        )
    }
}

text_column!(PostStatus);

/// Raw counters as reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementCounts {
    pub impressions: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub clicks: i64,
}

/// (likes + comments + shares) / impressions as a percentage, two decimals.
pub fn engagement_rate(counts: &EngagementCounts) -> f64 {
    if counts.impressions <= 0 {
        return 0.0;
    }
    let engaged = (counts.likes + counts.comments + counts.shares) as f64;
    let rate = engaged / counts.impressions as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Analytics snapshot stored alongside the post
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct PostAnalytics {
    pub impressions: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub clicks: i64,
    pub engagement_rate: f64,
    #[sqlx(rename = "analytics_synced_at")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl PostAnalytics {
    pub fn from_counts(counts: EngagementCounts, synced_at: DateTime<Utc>) -> Self {
        Self {
            impressions: counts.impressions,
            likes: counts.likes,
            comments: counts.comments,
            shares: counts.shares,
            clicks: counts.clicks,
            engagement_rate: engagement_rate(&counts),
            last_synced_at: Some(synced_at),
        }
    }
}

/// One intent to publish a content item to one platform
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SocialPost {
    pub id: i64,
    pub content_id: i64,
    pub content_kind: ContentKind,
    pub platform: Platform,
    pub social_account_id: i64,
    pub created_by: i64,
    pub caption: String,
    pub raw_caption: Option<String>,
    pub image_url: Option<String>,
    pub target_url: String,
    pub hashtags: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub status: PostStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub external_post_id: Option<String>,
    pub external_post_url: Option<String>,
    pub caption_generated: bool,
    #[sqlx(flatten)]
    pub analytics: PostAnalytics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SocialPost {
    pub fn content(&self) -> ContentRef {
        ContentRef {
            kind: self.content_kind,
            id: self.content_id,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status == PostStatus::Failed && self.retry_count < self.max_retries
    }

    /// Earliest time an automated retry may pick this post up again.
    /// Doubles per failed attempt: `base`, `2 * base`, `4 * base`, ...
    pub fn retry_due_at(&self, base: Duration) -> DateTime<Utc> {
        let attempts = self.retry_count.clamp(1, 16) as u32;
        let factor = 2_i32.pow(attempts - 1);
        self.updated_at + base * factor
    }

    /// Title for the link preview attachment: the first caption line
    pub fn preview_title(&self) -> String {
        let first_line = self
            .caption
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        truncate_chars(first_line, PREVIEW_CHARS)
    }

    pub fn preview_description(&self) -> String {
        let source = self.raw_caption.as_deref().unwrap_or(&self.caption);
        truncate_chars(source, PREVIEW_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Insert payload for a new post
#[derive(Debug, Clone)]
pub struct NewSocialPost {
    pub content: ContentRef,
    pub platform: Platform,
    pub social_account_id: i64,
    pub created_by: i64,
    pub caption: String,
    pub raw_caption: Option<String>,
    pub image_url: Option<String>,
    pub target_url: String,
    pub hashtags: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// `Scheduled` for later publishing, `Posting` when publishing right away
    pub status: PostStatus,
    pub max_retries: i32,
    pub caption_generated: bool,
}
