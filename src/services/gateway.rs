//! The seam between the posting workflow and an external platform.
//!
//! Implementations make network calls only. They never touch the stores;
//! callers own every state transition.

use async_trait::async_trait;

use crate::domain::social::{EngagementCounts, SocialAccount, SocialPost, TokenGrant};
use crate::services::linkedin::GatewayError;

/// Platform identifiers of a published post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub external_id: String,
    pub url: String,
}

#[async_trait]
pub trait PostingGateway: Send + Sync {
    /// Publish the post as `account`. Image problems degrade to a link preview.
    async fn publish(
        &self,
        post: &SocialPost,
        account: &SocialAccount,
    ) -> Result<PublishedPost, GatewayError>;

    /// Exchange the stored refresh token for a new credential.
    /// Returns `Ok(None)` when the account is outside the refresh window.
    async fn refresh_token(
        &self,
        account: &SocialAccount,
    ) -> Result<Option<TokenGrant>, GatewayError>;

    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        account: &SocialAccount,
    ) -> Result<EngagementCounts, GatewayError>;
}
