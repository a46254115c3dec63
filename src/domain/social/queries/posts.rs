//! Social post domain - DB queries for posts
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).
//!
//! Every status change is a conditional update on the expected current status,
//! so a post claimed by one worker cannot be claimed again by another.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use super::super::models::{NewSocialPost, Platform, PostAnalytics, PostStatus, SocialPost};
use crate::domain::content::ContentRef;

/// Insert a post unless an active post already exists for the same content and platform.
///
/// Relies on the partial unique index over `(content_kind, content_id, platform)` for
/// `scheduled`, `posting` and `posted` rows; returns `None` on conflict.
pub async fn insert_post<'e, E>(
    executor: E,
    new: &NewSocialPost,
) -> Result<Option<SocialPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO social_posts (
            content_id, content_kind, platform, social_account_id, created_by,
            caption, raw_caption, image_url, target_url, hashtags,
            scheduled_at, status, max_retries, caption_generated
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (content_kind, content_id, platform)
            WHERE status IN ('scheduled', 'posting', 'posted')
            DO NOTHING
        RETURNING *
        "#,
    )
    .bind(new.content.id)
    .bind(new.content.kind)
    .bind(new.platform)
    .bind(new.social_account_id)
    .bind(new.created_by)
    .bind(&new.caption)
    .bind(&new.raw_caption)
    .bind(&new.image_url)
    .bind(&new.target_url)
    .bind(&new.hashtags)
    .bind(new.scheduled_at)
    .bind(new.status)
    .bind(new.max_retries)
    .bind(new.caption_generated)
    .fetch_optional(executor)
    .await
}

/// Id of the active post blocking a new one for the same content and platform
pub async fn find_active_post_id<'e, E>(
    executor: E,
    content: ContentRef,
    platform: Platform,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM social_posts
        WHERE content_kind = $1 AND content_id = $2 AND platform = $3
          AND status IN ('scheduled', 'posting', 'posted')
        LIMIT 1
        "#,
    )
    .bind(content.kind)
    .bind(content.id)
    .bind(platform)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|r| r.0))
}

/// Active post other than `post_id` for the same content and platform
pub async fn find_blocking_post_id<'e, E>(
    executor: E,
    post_id: i64,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT o.id FROM social_posts p
        JOIN social_posts o
          ON o.content_kind = p.content_kind
         AND o.content_id = p.content_id
         AND o.platform = p.platform
         AND o.id <> p.id
        WHERE p.id = $1 AND o.status IN ('scheduled', 'posting', 'posted')
        LIMIT 1
        "#,
    )
    .bind(post_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|r| r.0))
}

pub async fn get_post<'e, E>(executor: E, post_id: i64) -> Result<Option<SocialPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT * FROM social_posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(executor)
        .await
}

/// Scheduled posts whose time has come, oldest first
pub async fn list_due_posts<'e, E>(
    executor: E,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<SocialPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT * FROM social_posts
        WHERE status = 'scheduled' AND scheduled_at <= $1
        ORDER BY scheduled_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Failed posts with retries left whose backoff (`base * 2^(retry_count - 1)`) has elapsed.
/// Posts superseded by an active post for the same content are left out.
pub async fn list_retry_candidates<'e, E>(
    executor: E,
    now: DateTime<Utc>,
    backoff_base_secs: i64,
    limit: i64,
) -> Result<Vec<SocialPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.* FROM social_posts p
        WHERE p.status = 'failed'
          AND p.retry_count < p.max_retries
          AND p.updated_at + make_interval(
                secs => $2::double precision * power(2, GREATEST(p.retry_count, 1) - 1)
              ) <= $1
          AND NOT EXISTS (
              SELECT 1 FROM social_posts o
              WHERE o.content_kind = p.content_kind
                AND o.content_id = p.content_id
                AND o.platform = p.platform
                AND o.status IN ('scheduled', 'posting', 'posted')
          )
        ORDER BY p.updated_at ASC, p.id ASC
        LIMIT $3
        "#,
    )
    .bind(now)
    .bind(backoff_base_secs)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Posted posts with analytics older than `stale_before`, newest posted first
pub async fn list_analytics_due<'e, E>(
    executor: E,
    stale_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<SocialPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT * FROM social_posts
        WHERE status = 'posted'
          AND external_post_id IS NOT NULL
          AND (analytics_synced_at IS NULL OR analytics_synced_at <= $1)
        ORDER BY posted_at DESC NULLS LAST, id DESC
        LIMIT $2
        "#,
    )
    .bind(stale_before)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Move a post into `posting` if it is still in `from`.
///
/// Claiming a `failed` post also requires retries to be left. No post is
/// claimed while another post for the same content and platform is active.
pub async fn claim_for_posting<'e, E>(
    executor: E,
    post_id: i64,
    from: PostStatus,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE social_posts p
        SET status = 'posting', error_message = NULL, updated_at = NOW()
        WHERE p.id = $1
          AND p.status = $2
          AND p.status IN ('draft', 'scheduled', 'failed')
          AND (p.status <> 'failed' OR p.retry_count < p.max_retries)
          AND NOT EXISTS (
              SELECT 1 FROM social_posts o
              WHERE o.content_kind = p.content_kind
                AND o.content_id = p.content_id
                AND o.platform = p.platform
                AND o.id <> p.id
                AND o.status IN ('scheduled', 'posting', 'posted')
          )
        "#,
    )
    .bind(post_id)
    .bind(from)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn mark_posted<'e, E>(
    executor: E,
    post_id: i64,
    external_post_id: &str,
    external_post_url: &str,
    posted_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE social_posts
        SET status = 'posted',
            external_post_id = $2,
            external_post_url = $3,
            posted_at = $4,
            error_message = NULL,
            updated_at = NOW()
        WHERE id = $1 AND status = 'posting'
        "#,
    )
    .bind(post_id)
    .bind(external_post_id)
    .bind(external_post_url)
    .bind(posted_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail a post still in `from`. The retry counter never passes `max_retries`.
pub async fn mark_failed<'e, E>(
    executor: E,
    post_id: i64,
    from: PostStatus,
    error_message: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE social_posts
        SET status = 'failed',
            error_message = $3,
            retry_count = LEAST(retry_count + 1, max_retries),
            updated_at = NOW()
        WHERE id = $1 AND status = $2 AND status IN ('scheduled', 'posting')
        "#,
    )
    .bind(post_id)
    .bind(from)
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail a `posting` post and use up its retries
pub async fn mark_failed_final<'e, E>(
    executor: E,
    post_id: i64,
    error_message: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE social_posts
        SET status = 'failed',
            error_message = $2,
            retry_count = max_retries,
            updated_at = NOW()
        WHERE id = $1 AND status = 'posting'
        "#,
    )
    .bind(post_id)
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail posts left in `posting` since before `stale_before`, counting one attempt
pub async fn fail_stale_posting<'e, E>(
    executor: E,
    stale_before: DateTime<Utc>,
    error_message: &str,
) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        UPDATE social_posts
        SET status = 'failed',
            error_message = $2,
            retry_count = LEAST(retry_count + 1, max_retries),
            updated_at = NOW()
        WHERE status = 'posting' AND updated_at < $1
        RETURNING id
        "#,
    )
    .bind(stale_before)
    .bind(error_message)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Store a fresh analytics snapshot. Only `posted` rows accept analytics.
pub async fn record_analytics<'e, E>(
    executor: E,
    post_id: i64,
    analytics: &PostAnalytics,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE social_posts
        SET impressions = $2,
            likes = $3,
            comments = $4,
            shares = $5,
            clicks = $6,
            engagement_rate = $7,
            analytics_synced_at = $8
        WHERE id = $1 AND status = 'posted'
        "#,
    )
    .bind(post_id)
    .bind(analytics.impressions)
    .bind(analytics.likes)
    .bind(analytics.comments)
    .bind(analytics.shares)
    .bind(analytics.clicks)
    .bind(analytics.engagement_rate)
    .bind(analytics.last_synced_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a post owned by `user_id` while it is still `draft`, `scheduled` or `failed`
pub async fn delete_post<'e, E>(
    executor: E,
    post_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM social_posts
        WHERE id = $1 AND created_by = $2
          AND status IN ('draft', 'scheduled', 'failed')
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
