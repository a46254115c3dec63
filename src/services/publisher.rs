//! Publishing a post that has already been claimed into `posting`

use chrono::Utc;

use super::deps::PostingDeps;
use super::events::PostEvent;
use super::gateway::PublishedPost;
use super::tokens::{self, RefreshError};
use crate::domain::social::{PostStatus, SocialAccount, SocialPost};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Posted(PublishedPost),
    Failed(String),
    /// The post left `posting` while the call was in flight
    Lost,
}

/// Publish `post` as `account` and record the terminal state.
///
/// The post must already be in `posting`. Upstream failures end in `failed`
/// with the upstream message; only store errors are returned as `Err`, after
/// a best-effort attempt to move the post out of `posting`.
pub async fn publish_claimed(
    deps: &PostingDeps,
    post: &SocialPost,
    account: SocialAccount,
) -> Result<PublishOutcome, StoreError> {
    let account = match tokens::refresh_if_needed(deps, account).await {
        Ok(account) => account,
        Err(RefreshError::Store(e)) => return Err(release_claim(deps, post, e).await),
        Err(e) => return fail(deps, post, &e.upstream_message()).await,
    };

    match deps.gateway.publish(post, &account).await {
        Ok(published) => record_posted(deps, post, &account, published).await,
        Err(e) => {
            let message = e.upstream_message();
            if e.is_credential_error() {
                if let Err(store_err) =
                    tokens::record_account_failure(deps, &account, &message).await
                {
                    tracing::error!(
                        account_id = account.id,
                        error = %store_err,
                        "could not record account failure"
                    );
                }
            }
            fail(deps, post, &message).await
        }
    }
}

async fn record_posted(
    deps: &PostingDeps,
    post: &SocialPost,
    account: &SocialAccount,
    published: PublishedPost,
) -> Result<PublishOutcome, StoreError> {
    let recorded = match deps
        .posts
        .mark_posted(post.id, &published.external_id, &published.url, Utc::now())
        .await
    {
        Ok(recorded) => recorded,
        Err(e) => {
            // Live upstream: the post must not be published again
            let message = format!(
                "Published as {} but the result could not be recorded: {}",
                published.external_id, e
            );
            match deps.posts.mark_failed_final(post.id, &message).await {
                Ok(true) => emit_failed(deps, post, &message),
                Ok(false) => {}
                Err(second) => tracing::error!(
                    post_id = post.id,
                    external_post_id = %published.external_id,
                    error = %second,
                    "could not record published post"
                ),
            }
            return Err(e);
        }
    };
    if !recorded {
        tracing::warn!(
            post_id = post.id,
            external_post_id = %published.external_id,
            "post published but no longer in posting state"
        );
        return Ok(PublishOutcome::Lost);
    }

    tracing::info!(
        post_id = post.id,
        account_id = account.id,
        external_post_id = %published.external_id,
        "published post"
    );
    deps.events.emit(PostEvent::PostSuccess {
        social_post_id: post.id,
        external_post_id: published.external_id.clone(),
    });
    Ok(PublishOutcome::Posted(published))
}

async fn fail(
    deps: &PostingDeps,
    post: &SocialPost,
    message: &str,
) -> Result<PublishOutcome, StoreError> {
    let recorded = deps
        .posts
        .mark_failed(post.id, PostStatus::Posting, message)
        .await?;
    if !recorded {
        return Ok(PublishOutcome::Lost);
    }

    tracing::warn!(post_id = post.id, error = %message, "publish failed");
    emit_failed(deps, post, message);
    Ok(PublishOutcome::Failed(message.to_string()))
}

/// Best-effort `posting -> failed` after a store error, handing the error back.
/// A post this cannot move is left to the dispatcher's stale sweep.
async fn release_claim(deps: &PostingDeps, post: &SocialPost, error: StoreError) -> StoreError {
    let message = format!("Publish interrupted: {}", error);
    match deps
        .posts
        .mark_failed(post.id, PostStatus::Posting, &message)
        .await
    {
        Ok(true) => emit_failed(deps, post, &message),
        Ok(false) => {}
        Err(e) => tracing::error!(post_id = post.id, error = %e, "could not release claimed post"),
    }
    error
}

fn emit_failed(deps: &PostingDeps, post: &SocialPost, message: &str) {
    deps.events.emit(PostEvent::PostFailed {
        social_post_id: post.id,
        error: message.to_string(),
    });
}
