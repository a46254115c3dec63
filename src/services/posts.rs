//! Authoring and operator operations on posts

use chrono::{DateTime, Utc};

use super::accounts::resolve_default_account;
use super::analytics::{self, SyncError};
use super::captions::{Caption, CaptionRequest, TemplateCaptions, fit_caption};
use super::deps::PostingDeps;
use super::publisher::{self, PublishOutcome};
use super::tokens::{self, RefreshError};
use crate::constants::MAX_CAPTION_CHARS;
use crate::domain::content::ContentRef;
use crate::domain::social::{
    NewSocialPost, PostAnalytics, PostStatus, PostingSettings, SocialAccount, SocialPost,
};
use crate::store::{ClaimOutcome, CreateOutcome, StoreError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublishMode {
    Now,
    Schedule(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct CreatePost {
    pub user_id: i64,
    pub content: ContentRef,
    pub mode: PublishMode,
    /// Explicit account; otherwise the user's default is used
    pub account_id: Option<i64>,
    pub custom_caption: Option<String>,
}

#[derive(Debug)]
pub struct CreatedPost {
    pub post: SocialPost,
    /// Set when the post was published immediately
    pub outcome: Option<PublishOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    ContentNotFound(ContentRef),
    #[error("no active account connected")]
    NoAccount,
    #[error("post {0} not found")]
    NotFound(i64),
    #[error("this content already has an active post ({0})")]
    Duplicate(i64),
    #[error("post {id} cannot be retried: {reason}")]
    NotRetryable { id: i64, reason: &'static str },
    #[error("post {0} cannot be deleted once published")]
    NotDeletable(i64),
    #[error("account {0} is missing or inactive")]
    AccountUnavailable(i64),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a post for a content item, publishing right away for `PublishMode::Now`.
pub async fn create_post(
    deps: &PostingDeps,
    request: CreatePost,
) -> Result<CreatedPost, PostError> {
    if let Some(caption) = &request.custom_caption {
        validate_caption(caption)?;
    }

    let content = deps
        .content
        .get_content(request.content)
        .await?
        .ok_or(PostError::ContentNotFound(request.content))?;

    let account = resolve_account(deps, request.user_id, request.account_id).await?;
    let account = tokens::refresh_if_needed(deps, account).await?;

    let settings = deps
        .settings
        .get_settings(request.user_id)
        .await?
        .unwrap_or_else(|| PostingSettings::defaults_for(request.user_id));

    let canonical = content.canonical_url(&deps.policy.site_base_url, request.content.kind);
    let target_url = settings.tracking_url(&canonical);

    let caption = match request.custom_caption.as_deref() {
        Some(text) => Caption::custom(text),
        None => {
            let caption_request = CaptionRequest {
                kind: request.content.kind,
                content: &content,
                target_url: &target_url,
                settings: &settings,
            };
            match deps.captions.generate(&caption_request).await {
                Ok(caption) => caption,
                Err(e) => {
                    tracing::warn!(error = %e, "caption generation failed, using template");
                    TemplateCaptions::default().render(&caption_request)
                }
            }
        }
    };

    let (status, scheduled_at) = match request.mode {
        PublishMode::Now => (PostStatus::Posting, None),
        PublishMode::Schedule(at) => (PostStatus::Scheduled, Some(at)),
    };

    let new = NewSocialPost {
        content: request.content,
        platform: deps.policy.platform,
        social_account_id: account.id,
        created_by: request.user_id,
        caption: fit_caption(&caption.caption),
        raw_caption: caption.raw_caption,
        image_url: content.image.clone(),
        target_url,
        hashtags: caption.hashtags,
        scheduled_at,
        status,
        max_retries: deps.policy.max_retries,
        caption_generated: caption.generated,
    };

    let post = match deps.posts.create_post(&new).await? {
        CreateOutcome::Created(post) => post,
        CreateOutcome::Duplicate(existing) => return Err(PostError::Duplicate(existing)),
    };

    tracing::info!(
        post_id = post.id,
        content_kind = request.content.kind.as_str(),
        content_id = request.content.id,
        status = post.status.as_str(),
        "created post"
    );

    if request.mode != PublishMode::Now {
        return Ok(CreatedPost {
            post,
            outcome: None,
        });
    }

    let outcome = publisher::publish_claimed(deps, &post, account).await?;
    let post = deps
        .posts
        .get_post(post.id)
        .await?
        .ok_or(PostError::NotFound(post.id))?;

    Ok(CreatedPost {
        post,
        outcome: Some(outcome),
    })
}

/// Manually retry a failed post while retries remain
pub async fn retry_post(
    deps: &PostingDeps,
    user_id: i64,
    post_id: i64,
) -> Result<PublishOutcome, PostError> {
    let post = owned_post(deps, user_id, post_id).await?;

    if post.status != PostStatus::Failed {
        return Err(PostError::NotRetryable {
            id: post_id,
            reason: "only failed posts can be retried",
        });
    }
    if post.retry_count >= post.max_retries {
        return Err(PostError::NotRetryable {
            id: post_id,
            reason: "retry limit reached",
        });
    }

    let account = deps
        .accounts
        .get_account(post.social_account_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or(PostError::AccountUnavailable(post.social_account_id))?;

    match deps
        .posts
        .claim_for_posting(post_id, PostStatus::Failed)
        .await?
    {
        ClaimOutcome::Claimed => {}
        ClaimOutcome::Duplicate(existing) => return Err(PostError::Duplicate(existing)),
        ClaimOutcome::Lost => {
            return Err(PostError::NotRetryable {
                id: post_id,
                reason: "post changed state",
            });
        }
    }

    tracing::info!(post_id, attempt = post.retry_count + 1, "retrying post");
    Ok(publisher::publish_claimed(deps, &post, account).await?)
}

/// Delete a post that has not been published
pub async fn delete_post(deps: &PostingDeps, user_id: i64, post_id: i64) -> Result<(), PostError> {
    let post = owned_post(deps, user_id, post_id).await?;
    if !post.status.is_deletable() {
        return Err(PostError::NotDeletable(post_id));
    }
    if !deps.posts.delete_post(post_id, user_id).await? {
        return Err(PostError::NotDeletable(post_id));
    }
    tracing::info!(post_id, "deleted post");
    Ok(())
}

/// Sync analytics for one post on request
pub async fn sync_post_analytics(
    deps: &PostingDeps,
    user_id: i64,
    post_id: i64,
) -> Result<PostAnalytics, PostError> {
    let post = owned_post(deps, user_id, post_id).await?;
    Ok(analytics::sync_post(deps, &post).await?)
}

async fn owned_post(
    deps: &PostingDeps,
    user_id: i64,
    post_id: i64,
) -> Result<SocialPost, PostError> {
    deps.posts
        .get_post(post_id)
        .await?
        .filter(|p| p.created_by == user_id)
        .ok_or(PostError::NotFound(post_id))
}

async fn resolve_account(
    deps: &PostingDeps,
    user_id: i64,
    account_id: Option<i64>,
) -> Result<SocialAccount, PostError> {
    let account = match account_id {
        Some(id) => deps.accounts.get_account(id).await?.filter(|a| {
            a.user_id == user_id && a.platform == deps.policy.platform && a.is_active
        }),
        None => resolve_default_account(deps, user_id).await?,
    };
    account.ok_or(PostError::NoAccount)
}

fn validate_caption(caption: &str) -> Result<(), PostError> {
    if caption.trim().is_empty() {
        return Err(PostError::Validation("caption cannot be empty".to_string()));
    }
    if caption.chars().count() > MAX_CAPTION_CHARS {
        return Err(PostError::Validation(format!(
            "caption exceeds {} characters",
            MAX_CAPTION_CHARS
        )));
    }
    Ok(())
}
