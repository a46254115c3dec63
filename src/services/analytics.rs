//! Engagement sync for one published post

use chrono::Utc;

use super::deps::PostingDeps;
use super::linkedin::GatewayError;
use super::tokens::{self, RefreshError};
use crate::domain::social::{PostAnalytics, PostStatus, SocialPost};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("post {0} has not been published")]
    NotPublished(i64),
    #[error("account {0} is missing or inactive")]
    AccountUnavailable(i64),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("analytics fetch failed: {0}")]
    Gateway(GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pull counters for `post`, derive the engagement rate, and store the snapshot.
///
/// Rejected upstream reads count against the account.
pub async fn sync_post(deps: &PostingDeps, post: &SocialPost) -> Result<PostAnalytics, SyncError> {
    let external_id = post
        .external_post_id
        .as_deref()
        .filter(|_| post.status == PostStatus::Posted)
        .ok_or(SyncError::NotPublished(post.id))?;

    let account = deps
        .accounts
        .get_account(post.social_account_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or(SyncError::AccountUnavailable(post.social_account_id))?;

    let account = tokens::refresh_if_needed(deps, account).await?;

    let counts = match deps.gateway.fetch_analytics(external_id, &account).await {
        Ok(counts) => counts,
        Err(e) => {
            if matches!(e, GatewayError::Api { .. }) {
                tokens::record_account_failure(deps, &account, &e.upstream_message()).await?;
            }
            return Err(SyncError::Gateway(e));
        }
    };

    let analytics = PostAnalytics::from_counts(counts, Utc::now());
    if !deps.posts.record_analytics(post.id, &analytics).await? {
        tracing::warn!(post_id = post.id, "analytics not stored, post is no longer posted");
    }

    tracing::debug!(
        post_id = post.id,
        impressions = analytics.impressions,
        engagement_rate = analytics.engagement_rate,
        "synced analytics"
    );
    Ok(analytics)
}
