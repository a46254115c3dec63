use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::{
    AccountStore, ClaimOutcome, ContentSource, CreateOutcome, LeaseStore, PostStore,
    SettingsStore, StoreError,
};
use crate::domain::content::{self, ContentRef, ContentSummary};
use crate::domain::social::{
    NewSocialAccount, NewSocialPost, Platform, PostAnalytics, PostStatus, PostingSettings,
    SocialAccount, SocialPost, TokenGrant, accounts, leases, posts, settings,
};

/// Postgres-backed store shared by the HTTP layer and the workers
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn get_account(&self, account_id: i64) -> Result<Option<SocialAccount>, StoreError> {
        Ok(accounts::get_account(&self.pool, account_id).await?)
    }

    async fn list_refreshable_accounts(
        &self,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>, StoreError> {
        Ok(accounts::list_refreshable_accounts(&self.pool, platform).await?)
    }

    async fn list_active_accounts(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>, StoreError> {
        Ok(accounts::list_active_accounts(&self.pool, user_id, platform).await?)
    }

    async fn store_refreshed_tokens(
        &self,
        account_id: i64,
        grant: &TokenGrant,
    ) -> Result<Option<SocialAccount>, StoreError> {
        Ok(accounts::store_refreshed_tokens(&self.pool, account_id, grant).await?)
    }

    async fn record_account_error(
        &self,
        account_id: i64,
        error: &str,
        threshold: i32,
    ) -> Result<Option<SocialAccount>, StoreError> {
        Ok(accounts::record_account_error(&self.pool, account_id, error, threshold).await?)
    }

    async fn upsert_account(&self, new: &NewSocialAccount) -> Result<SocialAccount, StoreError> {
        Ok(accounts::upsert_account(&self.pool, new).await?)
    }

    async fn delete_account(&self, account_id: i64, user_id: i64) -> Result<bool, StoreError> {
        Ok(accounts::delete_account(&self.pool, account_id, user_id).await?)
    }

    async fn save_oauth_state(&self, state: &str, user_id: i64) -> Result<(), StoreError> {
        Ok(accounts::save_oauth_state(&self.pool, state, user_id).await?)
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<i64>, StoreError> {
        Ok(accounts::take_oauth_state(&self.pool, state).await?)
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create_post(&self, new: &NewSocialPost) -> Result<CreateOutcome, StoreError> {
        // A blocking row can disappear between the insert and the lookup; try once more.
        for _ in 0..2 {
            if let Some(post) = posts::insert_post(&self.pool, new).await? {
                return Ok(CreateOutcome::Created(post));
            }
            if let Some(existing) =
                posts::find_active_post_id(&self.pool, new.content, new.platform).await?
            {
                return Ok(CreateOutcome::Duplicate(existing));
            }
        }
        Err(StoreError::Conflict(format!(
            "could not create post for {}",
            new.content
        )))
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<SocialPost>, StoreError> {
        Ok(posts::get_post(&self.pool, post_id).await?)
    }

    async fn list_due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError> {
        Ok(posts::list_due_posts(&self.pool, now, limit).await?)
    }

    async fn list_retry_candidates(
        &self,
        now: DateTime<Utc>,
        backoff_base: Duration,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError> {
        Ok(posts::list_retry_candidates(&self.pool, now, backoff_base.num_seconds(), limit).await?)
    }

    async fn list_analytics_due(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError> {
        Ok(posts::list_analytics_due(&self.pool, stale_before, limit).await?)
    }

    async fn claim_for_posting(
        &self,
        post_id: i64,
        from: PostStatus,
    ) -> Result<ClaimOutcome, StoreError> {
        let claimed = match posts::claim_for_posting(&self.pool, post_id, from).await {
            Ok(claimed) => claimed,
            // A sibling post got claimed concurrently and holds the partial unique index
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => false,
            Err(e) => return Err(e.into()),
        };
        if claimed {
            return Ok(ClaimOutcome::Claimed);
        }

        match posts::find_blocking_post_id(&self.pool, post_id).await? {
            Some(existing) => Ok(ClaimOutcome::Duplicate(existing)),
            None => Ok(ClaimOutcome::Lost),
        }
    }

    async fn mark_posted(
        &self,
        post_id: i64,
        external_post_id: &str,
        external_post_url: &str,
        posted_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(posts::mark_posted(
            &self.pool,
            post_id,
            external_post_id,
            external_post_url,
            posted_at,
        )
        .await?)
    }

    async fn mark_failed(
        &self,
        post_id: i64,
        from: PostStatus,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        Ok(posts::mark_failed(&self.pool, post_id, from, error_message).await?)
    }

    async fn mark_failed_final(
        &self,
        post_id: i64,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        Ok(posts::mark_failed_final(&self.pool, post_id, error_message).await?)
    }

    async fn fail_stale_posting(
        &self,
        stale_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<i64>, StoreError> {
        Ok(posts::fail_stale_posting(&self.pool, stale_before, error_message).await?)
    }

    async fn record_analytics(
        &self,
        post_id: i64,
        analytics: &PostAnalytics,
    ) -> Result<bool, StoreError> {
        Ok(posts::record_analytics(&self.pool, post_id, analytics).await?)
    }

    async fn delete_post(&self, post_id: i64, user_id: i64) -> Result<bool, StoreError> {
        Ok(posts::delete_post(&self.pool, post_id, user_id).await?)
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn get_settings(&self, user_id: i64) -> Result<Option<PostingSettings>, StoreError> {
        Ok(settings::get_settings(&self.pool, user_id).await?)
    }

    async fn set_default_account(
        &self,
        user_id: i64,
        account_id: Option<i64>,
    ) -> Result<(), StoreError> {
        Ok(settings::set_default_account(&self.pool, user_id, account_id).await?)
    }

    async fn clear_default_account(&self, account_id: i64) -> Result<(), StoreError> {
        Ok(settings::clear_default_account(&self.pool, account_id).await?)
    }
}

#[async_trait]
impl ContentSource for PgStore {
    async fn get_content(
        &self,
        item: ContentRef,
    ) -> Result<Option<ContentSummary>, StoreError> {
        Ok(content::get_content_by_id(&self.pool, item).await?)
    }
}

#[async_trait]
impl LeaseStore for PgStore {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(leases::try_acquire_lease(&self.pool, name, holder, ttl.num_seconds()).await?)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), StoreError> {
        Ok(leases::release_lease(&self.pool, name, holder).await?)
    }
}
