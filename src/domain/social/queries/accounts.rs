//! Social account domain - DB queries for connected accounts and OAuth state
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use sqlx::{Executor, Postgres};

use super::super::models::{NewSocialAccount, Platform, SocialAccount, TokenGrant};
use crate::constants::OAUTH_STATE_TTL_MINUTES;

pub async fn get_account<'e, E>(
    executor: E,
    account_id: i64,
) -> Result<Option<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT * FROM social_accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(executor)
        .await
}

/// Active accounts holding a refresh token
pub async fn list_refreshable_accounts<'e, E>(
    executor: E,
    platform: Platform,
) -> Result<Vec<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT * FROM social_accounts
        WHERE platform = $1 AND is_active = TRUE AND refresh_token IS NOT NULL
        ORDER BY id ASC
        "#,
    )
    .bind(platform)
    .fetch_all(executor)
    .await
}

/// A user's active accounts on a platform, oldest connection first
pub async fn list_active_accounts<'e, E>(
    executor: E,
    user_id: i64,
    platform: Platform,
) -> Result<Vec<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT * FROM social_accounts
        WHERE user_id = $1 AND platform = $2 AND is_active = TRUE
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(user_id)
    .bind(platform)
    .fetch_all(executor)
    .await
}

/// Persist a refreshed credential and clear the error state
pub async fn store_refreshed_tokens<'e, E>(
    executor: E,
    account_id: i64,
    grant: &TokenGrant,
) -> Result<Option<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE social_accounts SET
            access_token = $2,
            refresh_token = COALESCE($3, refresh_token),
            expires_at = $4,
            last_error = NULL,
            error_count = 0,
            last_synced_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(&grant.access_token)
    .bind(&grant.refresh_token)
    .bind(grant.expires_at)
    .fetch_optional(executor)
    .await
}

/// Count one failure against the account, deactivating it once the count
/// reaches `threshold`. Both happen in one statement.
pub async fn record_account_error<'e, E>(
    executor: E,
    account_id: i64,
    error: &str,
    threshold: i32,
) -> Result<Option<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE social_accounts SET
            last_error = $2,
            error_count = error_count + 1,
            is_active = CASE WHEN error_count + 1 >= $3 THEN FALSE ELSE is_active END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(error)
    .bind(threshold)
    .fetch_optional(executor)
    .await
}

/// Create or reconnect an account after a completed OAuth handshake.
/// Reconnecting reactivates the account and resets its error state.
pub async fn upsert_account<'e, E>(
    executor: E,
    new: &NewSocialAccount,
) -> Result<SocialAccount, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO social_accounts (
            user_id, platform, account_type, external_account_id,
            account_name, account_email, profile_image_url,
            access_token, refresh_token, expires_at, scopes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (user_id, platform, external_account_id) DO UPDATE SET
            account_name = EXCLUDED.account_name,
            account_email = EXCLUDED.account_email,
            profile_image_url = EXCLUDED.profile_image_url,
            access_token = EXCLUDED.access_token,
            refresh_token = COALESCE(EXCLUDED.refresh_token, social_accounts.refresh_token),
            expires_at = EXCLUDED.expires_at,
            scopes = EXCLUDED.scopes,
            is_active = TRUE,
            last_error = NULL,
            error_count = 0,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(new.user_id)
    .bind(new.platform)
    .bind(new.account_type)
    .bind(&new.external_account_id)
    .bind(&new.account_name)
    .bind(&new.account_email)
    .bind(&new.profile_image_url)
    .bind(&new.grant.access_token)
    .bind(&new.grant.refresh_token)
    .bind(new.grant.expires_at)
    .bind(&new.scopes)
    .fetch_one(executor)
    .await
}

pub async fn delete_account<'e, E>(
    executor: E,
    account_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM social_accounts WHERE id = $1 AND user_id = $2")
        .bind(account_id)
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn save_oauth_state<'e, E>(
    executor: E,
    state: &str,
    user_id: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO oauth_states (state, user_id) VALUES ($1, $2)")
        .bind(state)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Consume an OAuth state, returning the user that started the handshake.
///
/// DELETE + RETURNING makes each state usable once.
pub async fn take_oauth_state<'e, E>(executor: E, state: &str) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        DELETE FROM oauth_states
        WHERE state = $1 AND created_at > NOW() - make_interval(mins => $2)
        RETURNING user_id
        "#,
    )
    .bind(state)
    .bind(OAUTH_STATE_TTL_MINUTES as i32)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|r| r.0))
}
