//! Posting settings - DB queries

use sqlx::{Executor, Postgres};

use super::super::models::PostingSettings;

pub async fn get_settings<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<PostingSettings>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT user_id, default_account_id, include_hashtags, max_hashtags,
               utm_source, utm_medium, utm_campaign, updated_at
        FROM posting_settings
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Point the user's default at `account_id`, or clear it with `None`.
/// Creates the settings row with defaults when missing.
pub async fn set_default_account<'e, E>(
    executor: E,
    user_id: i64,
    account_id: Option<i64>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO posting_settings (user_id, default_account_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET
            default_account_id = EXCLUDED.default_account_id,
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(account_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Clear the default for every user pointing at `account_id`
pub async fn clear_default_account<'e, E>(executor: E, account_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE posting_settings
        SET default_account_id = NULL, updated_at = NOW()
        WHERE default_account_id = $1
        "#,
    )
    .bind(account_id)
    .execute(executor)
    .await?;
    Ok(())
}
