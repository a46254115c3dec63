//! Shared credential refresh routine
//!
//! Used on demand before publishing and syncing, and by the token refresh
//! worker. Every failure is counted on the account.

use chrono::Utc;

use super::deps::PostingDeps;
use super::linkedin::GatewayError;
use crate::domain::social::SocialAccount;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("token refresh failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("account {0} no longer exists")]
    AccountMissing(i64),
}

impl RefreshError {
    pub fn upstream_message(&self) -> String {
        match self {
            RefreshError::Gateway(e) => format!("Token refresh failed: {}", e.upstream_message()),
            other => other.to_string(),
        }
    }
}

/// Ensures the account holds a credential outside the refresh window,
/// refreshing it when needed. Returns the account as now stored.
pub async fn refresh_if_needed(
    deps: &PostingDeps,
    account: SocialAccount,
) -> Result<SocialAccount, RefreshError> {
    if !account.needs_refresh(Utc::now()) {
        return Ok(account);
    }

    match deps.gateway.refresh_token(&account).await {
        Ok(Some(grant)) => {
            let updated = deps
                .accounts
                .store_refreshed_tokens(account.id, &grant)
                .await?
                .ok_or(RefreshError::AccountMissing(account.id))?;
            tracing::info!(
                account_id = account.id,
                account = updated.label(),
                expires_at = %updated.expires_at,
                "refreshed access token"
            );
            Ok(updated)
        }
        Ok(None) => Ok(account),
        Err(e) => {
            tracing::warn!(account_id = account.id, error = %e, "token refresh failed");
            record_account_failure(deps, &account, &e.upstream_message()).await?;
            Err(e.into())
        }
    }
}

/// Count a failure against the account; deactivation happens in the store
/// once the threshold is reached.
pub async fn record_account_failure(
    deps: &PostingDeps,
    account: &SocialAccount,
    message: &str,
) -> Result<Option<SocialAccount>, StoreError> {
    let updated = deps
        .accounts
        .record_account_error(account.id, message, deps.policy.account_error_threshold)
        .await?;

    if let Some(acc) = updated.as_ref().filter(|a| account.is_active && !a.is_active) {
        tracing::warn!(
            account_id = acc.id,
            account = acc.label(),
            error_count = acc.error_count,
            "deactivated account after repeated failures"
        );
    }
    Ok(updated)
}
