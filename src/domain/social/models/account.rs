//! Connected account model definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::codec::text_column;
use crate::constants::REFRESH_WINDOW_HOURS;

/// External platform an account or post belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    LinkedIn,
    Twitter,
    Facebook,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linkedin" => Some(Platform::LinkedIn),
            "twitter" => Some(Platform::Twitter),
            "facebook" => Some(Platform::Facebook),
            "instagram" => Some(Platform::Instagram),
            _ => None,
        }
    }
}

text_column!(Platform);

/// Whether the account posts as a person or as a company page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Personal,
    Company,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Personal => "personal",
            AccountType::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(AccountType::Personal),
            "company" => Some(AccountType::Company),
            _ => None,
        }
    }
}

text_column!(AccountType);

/// Freshness policy shared by every worker: a credential needs refreshing
/// once it expires within the refresh window.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now + Duration::hours(REFRESH_WINDOW_HOURS)
}

/// An OAuth credential binding for one external account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SocialAccount {
    pub id: i64,
    pub user_id: i64,
    pub platform: Platform,
    pub account_type: AccountType,
    pub external_account_id: String,
    pub organization_id: Option<String>,
    pub account_name: Option<String>,
    pub account_email: Option<String>,
    pub profile_image_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub last_error: Option<String>,
    pub error_count: i32,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SocialAccount {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        needs_refresh(self.expires_at, now)
    }

    /// URN used as the author of published posts
    pub fn author_urn(&self) -> String {
        match (&self.account_type, &self.organization_id) {
            (AccountType::Company, Some(org_id)) => format!("urn:li:organization:{}", org_id),
            _ => format!("urn:li:person:{}", self.external_account_id),
        }
    }

    /// Human-readable identifier for log lines
    pub fn label(&self) -> &str {
        self.account_email
            .as_deref()
            .or(self.account_name.as_deref())
            .unwrap_or(&self.external_account_id)
    }

    /// Copy of this account carrying a freshly issued credential
    pub fn with_grant(mut self, grant: &TokenGrant) -> Self {
        self.access_token = grant.access_token.clone();
        if let Some(ref refresh_token) = grant.refresh_token {
            self.refresh_token = Some(refresh_token.clone());
        }
        self.expires_at = grant.expires_at;
        self.last_error = None;
        self.error_count = 0;
        self
    }
}

/// Credential issued by a token exchange
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent when the platform keeps the previous refresh token valid
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Account fields captured by a completed OAuth handshake
#[derive(Debug, Clone)]
pub struct NewSocialAccount {
    pub user_id: i64,
    pub platform: Platform,
    pub account_type: AccountType,
    pub external_account_id: String,
    pub account_name: Option<String>,
    pub account_email: Option<String>,
    pub profile_image_url: Option<String>,
    pub scopes: Vec<String>,
    pub grant: TokenGrant,
}
