//! Connecting, resolving and disconnecting social accounts

use super::deps::PostingDeps;
use super::linkedin::{DEFAULT_SCOPES, GatewayError, LinkedInClient};
use crate::domain::social::{AccountType, NewSocialAccount, SocialAccount};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid or expired OAuth state")]
    InvalidState,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The account posts go to when none is chosen explicitly: the settings
/// default when it is still active, else the oldest active connection.
/// Never returns an inactive account.
pub async fn resolve_default_account(
    deps: &PostingDeps,
    user_id: i64,
) -> Result<Option<SocialAccount>, StoreError> {
    let platform = deps.policy.platform;

    let default_id = deps
        .settings
        .get_settings(user_id)
        .await?
        .and_then(|s| s.default_account_id);
    if let Some(id) = default_id {
        let account = deps
            .accounts
            .get_account(id)
            .await?
            .filter(|a| a.user_id == user_id && a.platform == platform && a.is_active);
        if account.is_some() {
            return Ok(account);
        }
    }

    let mut active = deps.accounts.list_active_accounts(user_id, platform).await?;
    Ok(if active.is_empty() {
        None
    } else {
        Some(active.remove(0))
    })
}

/// Step 1: remember a fresh state for `user_id` and return the authorization URL
pub async fn start_connect(
    deps: &PostingDeps,
    client: &LinkedInClient,
    user_id: i64,
) -> Result<String, StoreError> {
    let state = LinkedInClient::generate_state();
    deps.accounts.save_oauth_state(&state, user_id).await?;
    Ok(client.authorize_url(&state))
}

/// Step 2: finish the handshake and store the account.
///
/// Reconnecting an existing account reactivates it. The account becomes the
/// user's default when they have none.
pub async fn connect_account(
    deps: &PostingDeps,
    client: &LinkedInClient,
    state: &str,
    code: &str,
) -> Result<SocialAccount, ConnectError> {
    let user_id = deps
        .accounts
        .take_oauth_state(state)
        .await?
        .ok_or(ConnectError::InvalidState)?;

    let grant = client.exchange_code(code).await?;
    let profile = client.get_userinfo(&grant.access_token).await?;

    let account = deps
        .accounts
        .upsert_account(&NewSocialAccount {
            user_id,
            platform: deps.policy.platform,
            account_type: AccountType::Personal,
            external_account_id: profile.sub,
            account_name: profile.name,
            account_email: profile.email,
            profile_image_url: profile.picture,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            grant,
        })
        .await?;

    let default_id = deps
        .settings
        .get_settings(user_id)
        .await?
        .and_then(|s| s.default_account_id);
    let has_default = match default_id {
        Some(id) => deps
            .accounts
            .get_account(id)
            .await?
            .is_some_and(|a| a.user_id == user_id && a.is_active),
        None => false,
    };
    if !has_default {
        deps.settings
            .set_default_account(user_id, Some(account.id))
            .await?;
    }

    tracing::info!(
        user_id,
        account_id = account.id,
        account = account.label(),
        "connected account"
    );
    Ok(account)
}

/// Remove an account owned by `user_id`. Returns false when there was none.
pub async fn disconnect_account(
    deps: &PostingDeps,
    user_id: i64,
    account_id: i64,
) -> Result<bool, StoreError> {
    let owned = deps
        .accounts
        .get_account(account_id)
        .await?
        .is_some_and(|a| a.user_id == user_id);
    if !owned {
        return Ok(false);
    }

    deps.settings.clear_default_account(account_id).await?;
    let deleted = deps.accounts.delete_account(account_id, user_id).await?;
    if deleted {
        tracing::info!(user_id, account_id, "disconnected account");
    }
    Ok(deleted)
}
