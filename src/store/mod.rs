//! Persistence seams used by the posting services and workers.
//!
//! `PgStore` implements every trait over the `domain::social` queries. Tests
//! swap in `memory::MemoryStore`, which keeps the same conditional-update rules.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::content::{ContentRef, ContentSummary};
use crate::domain::social::{
    NewSocialAccount, NewSocialPost, Platform, PostAnalytics, PostStatus, PostingSettings,
    SocialAccount, SocialPost, TokenGrant,
};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("write conflict: {0}")]
    Conflict(String),
}

/// Result of creating a post under the one-active-post-per-content rule
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(SocialPost),
    /// An active post already exists for the same content and platform
    Duplicate(i64),
}

/// Result of moving a post into `posting`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The post is no longer in the expected state
    Lost,
    /// Another active post exists for the same content and platform
    Duplicate(i64),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, account_id: i64) -> Result<Option<SocialAccount>, StoreError>;

    async fn list_refreshable_accounts(
        &self,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>, StoreError>;

    async fn list_active_accounts(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>, StoreError>;

    async fn store_refreshed_tokens(
        &self,
        account_id: i64,
        grant: &TokenGrant,
    ) -> Result<Option<SocialAccount>, StoreError>;

    /// Increment the error count and deactivate at `threshold`, atomically
    async fn record_account_error(
        &self,
        account_id: i64,
        error: &str,
        threshold: i32,
    ) -> Result<Option<SocialAccount>, StoreError>;

    async fn upsert_account(&self, new: &NewSocialAccount) -> Result<SocialAccount, StoreError>;

    async fn delete_account(&self, account_id: i64, user_id: i64) -> Result<bool, StoreError>;

    async fn save_oauth_state(&self, state: &str, user_id: i64) -> Result<(), StoreError>;

    async fn take_oauth_state(&self, state: &str) -> Result<Option<i64>, StoreError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, new: &NewSocialPost) -> Result<CreateOutcome, StoreError>;

    async fn get_post(&self, post_id: i64) -> Result<Option<SocialPost>, StoreError>;

    async fn list_due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError>;

    async fn list_retry_candidates(
        &self,
        now: DateTime<Utc>,
        backoff_base: Duration,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError>;

    async fn list_analytics_due(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError>;

    /// `from -> posting`, only if the post is still in `from` and no other
    /// post for the same content and platform is active
    async fn claim_for_posting(
        &self,
        post_id: i64,
        from: PostStatus,
    ) -> Result<ClaimOutcome, StoreError>;

    /// `posting -> posted`
    async fn mark_posted(
        &self,
        post_id: i64,
        external_post_id: &str,
        external_post_url: &str,
        posted_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `from -> failed`, counting one attempt
    async fn mark_failed(
        &self,
        post_id: i64,
        from: PostStatus,
        error_message: &str,
    ) -> Result<bool, StoreError>;

    /// `posting -> failed` with no retries left
    async fn mark_failed_final(&self, post_id: i64, error_message: &str)
    -> Result<bool, StoreError>;

    /// Fail posts stuck in `posting` since before `stale_before`, returning their ids
    async fn fail_stale_posting(
        &self,
        stale_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<i64>, StoreError>;

    async fn record_analytics(
        &self,
        post_id: i64,
        analytics: &PostAnalytics,
    ) -> Result<bool, StoreError>;

    async fn delete_post(&self, post_id: i64, user_id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self, user_id: i64) -> Result<Option<PostingSettings>, StoreError>;

    async fn set_default_account(
        &self,
        user_id: i64,
        account_id: Option<i64>,
    ) -> Result<(), StoreError>;

    async fn clear_default_account(&self, account_id: i64) -> Result<(), StoreError>;
}

/// Read access to the CMS items posts are built from
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn get_content(&self, content: ContentRef)
    -> Result<Option<ContentSummary>, StoreError>;
}

/// Cross-process exclusion for periodic workers
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn release(&self, name: &str, holder: &str) -> Result<(), StoreError>;
}
