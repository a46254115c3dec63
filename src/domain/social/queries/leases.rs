//! Worker leases - one row per periodic worker, held by at most one process

use sqlx::{Executor, Postgres};

/// Take the lease for `name` when it is free, expired, or already ours
pub async fn try_acquire_lease<'e, E>(
    executor: E,
    name: &str,
    holder: &str,
    lease_secs: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        INSERT INTO worker_leases (name, holder, leased_until)
        VALUES ($1, $2, NOW() + ($3::text || ' seconds')::interval)
        ON CONFLICT (name) DO UPDATE SET
            holder = EXCLUDED.holder,
            leased_until = EXCLUDED.leased_until
        WHERE worker_leases.leased_until < NOW()
           OR worker_leases.holder = EXCLUDED.holder
        RETURNING holder
        "#,
    )
    .bind(name)
    .bind(holder)
    .bind(lease_secs)
    .fetch_optional(executor)
    .await?;

    Ok(row.is_some())
}

pub async fn release_lease<'e, E>(executor: E, name: &str, holder: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM worker_leases WHERE name = $1 AND holder = $2")
        .bind(name)
        .bind(holder)
        .execute(executor)
        .await?;
    Ok(())
}
