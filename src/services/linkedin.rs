use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::gateway::{PostingGateway, PublishedPost};
use crate::domain::social::{EngagementCounts, SocialAccount, SocialPost, TokenGrant};

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const POST_URL_BASE: &str = "https://www.linkedin.com/feed/update";
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email", "w_member_social"];

#[derive(Debug, Clone)]
pub struct LinkedInConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// REST API host, e.g. `https://api.linkedin.com`
    pub api_base_url: String,
    /// OAuth host, e.g. `https://www.linkedin.com`
    pub oauth_base_url: String,
    /// Value of the `LinkedIn-Version` header
    pub api_version: String,
    pub timeout: std::time::Duration,
}

#[derive(Clone)]
pub struct LinkedInClient {
    config: LinkedInConfig,
    http: Client,
}

impl LinkedInClient {
    pub fn new(config: LinkedInConfig) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Generate random state for CSRF protection
    pub fn generate_state() -> String {
        let bytes: [u8; 16] = rand::rng().random();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Step 1: Build the authorization URL for a stored `state`
    pub fn authorize_url(&self, state: &str) -> String {
        let scope = DEFAULT_SCOPES.join("%20");
        format!(
            "{}/oauth/v2/authorization?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.config.oauth_base_url,
            percent_encode(&self.config.client_id),
            percent_encode(&self.config.redirect_uri),
            scope,
            percent_encode(state)
        )
    }

    /// Step 2: Exchange authorization code for access token
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, GatewayError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.request_token(&params).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.request_token(&params).await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant, GatewayError> {
        let url = format!("{}/oauth/v2/accessToken", self.config.oauth_base_url);

        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(params)
            .send()
            .await?;

        let token: TokenResponse = check(resp).await?.json().await?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }

    /// Get the authenticated member's OpenID profile
    pub async fn get_userinfo(&self, access_token: &str) -> Result<LinkedInUser, GatewayError> {
        let url = format!("{}/v2/userinfo", self.config.api_base_url);

        let resp = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }

    /// Versioned REST request with the headers every `/rest` endpoint expects
    fn rest(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.config.api_base_url, path))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("LinkedIn-Version", &self.config.api_version)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
    }

    /// Create a post and return its URN
    pub async fn create_post(
        &self,
        access_token: &str,
        payload: &PostPayload,
    ) -> Result<String, GatewayError> {
        let resp = self
            .rest(Method::POST, "/rest/posts", access_token)
            .json(payload)
            .send()
            .await?;
        let resp = check(resp).await?;

        if let Some(id) = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            return Ok(id.to_string());
        }

        let body = resp.text().await?;
        serde_json::from_str::<CreatedEntity>(&body)
            .map(|e| e.id)
            .map_err(|_| {
                GatewayError::InvalidResponse(format!("post id missing from response: {}", body))
            })
    }

    /// Upload an image for `owner_urn` and return the image URN.
    ///
    /// Three steps: register the upload, download the source bytes, then PUT
    /// them to the URL LinkedIn handed back.
    pub async fn upload_image(
        &self,
        access_token: &str,
        owner_urn: &str,
        image_url: &str,
    ) -> Result<String, GatewayError> {
        let init = InitializeUploadRequest {
            initialize_upload_request: InitializeUploadBody {
                owner: owner_urn.to_string(),
            },
        };
        let resp = self
            .rest(Method::POST, "/rest/images?action=initializeUpload", access_token)
            .json(&init)
            .send()
            .await?;
        let upload: InitializeUploadResponse = check(resp).await?.json().await?;

        let source = self.http.get(image_url).send().await?;
        let bytes = check(source).await?.bytes().await?;

        let resp = self
            .http
            .put(&upload.value.upload_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        check(resp).await?;

        Ok(upload.value.image)
    }

    /// Engagement counters for one post URN
    pub async fn get_social_actions(
        &self,
        access_token: &str,
        post_urn: &str,
    ) -> Result<EngagementCounts, GatewayError> {
        let path = format!("/rest/socialActions/{}", percent_encode(post_urn));
        let resp = self.rest(Method::GET, &path, access_token).send().await?;
        let stats: SocialActionsResponse = check(resp).await?.json().await?;

        Ok(EngagementCounts {
            impressions: stats.impression_count.unwrap_or(0),
            likes: stats.like_count.unwrap_or(0),
            comments: stats.comment_count.unwrap_or(0),
            shares: stats.share_count.unwrap_or(0),
            clicks: stats.click_count.unwrap_or(0),
        })
    }
}

#[async_trait]
impl PostingGateway for LinkedInClient {
    async fn publish(
        &self,
        post: &SocialPost,
        account: &SocialAccount,
    ) -> Result<PublishedPost, GatewayError> {
        let author = account.author_urn();

        let media = match post.image_url.as_deref() {
            Some(image_url) => {
                match self
                    .upload_image(&account.access_token, &author, image_url)
                    .await
                {
                    Ok(image_urn) => Some(image_urn),
                    Err(e) => {
                        tracing::warn!(
                            post_id = post.id,
                            error = %e,
                            "image upload failed, falling back to link preview"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let content = match media {
            Some(id) => PostContent::Media {
                id,
                title: post.preview_title(),
            },
            None => PostContent::Article {
                source: post.target_url.clone(),
                title: post.preview_title(),
                description: post.preview_description(),
            },
        };

        let payload = PostPayload::new(author, post.caption.clone(), content);
        let external_id = self.create_post(&account.access_token, &payload).await?;
        let url = post_url(&external_id);

        Ok(PublishedPost { external_id, url })
    }

    async fn refresh_token(
        &self,
        account: &SocialAccount,
    ) -> Result<Option<TokenGrant>, GatewayError> {
        if !account.needs_refresh(Utc::now()) {
            return Ok(None);
        }
        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(GatewayError::MissingRefreshToken)?;

        self.refresh_grant(refresh_token).await.map(Some)
    }

    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        account: &SocialAccount,
    ) -> Result<EngagementCounts, GatewayError> {
        self.get_social_actions(&account.access_token, external_post_id)
            .await
    }
}

/// Public URL of a post URN
pub fn post_url(urn: &str) -> String {
    format!("{}/{}", POST_URL_BASE, urn)
}

/// Turn non-2xx responses into `GatewayError::Api` carrying the upstream message
async fn check(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(GatewayError::Api {
        status: status.as_u16(),
        message: upstream_message(&text),
    })
}

/// LinkedIn errors carry a JSON `message`; fall back to the raw body
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|e| e.message.or(e.error_description))
        .unwrap_or_else(|| body.to_string())
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub author: String,
    pub commentary: String,
    pub visibility: &'static str,
    pub distribution: Distribution,
    pub content: PostContent,
    pub lifecycle_state: &'static str,
    pub is_reshare_disabled_by_author: bool,
}

impl PostPayload {
    pub fn new(author: String, commentary: String, content: PostContent) -> Self {
        Self {
            author,
            commentary,
            visibility: "PUBLIC",
            distribution: Distribution {
                feed_distribution: "MAIN_FEED",
                target_entities: Vec::new(),
                third_party_distribution_channels: Vec::new(),
            },
            content,
            lifecycle_state: "PUBLISHED",
            is_reshare_disabled_by_author: false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub feed_distribution: &'static str,
    pub target_entities: Vec<String>,
    pub third_party_distribution_channels: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PostContent {
    Media {
        id: String,
        title: String,
    },
    Article {
        source: String,
        title: String,
        description: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeUploadRequest {
    initialize_upload_request: InitializeUploadBody,
}

#[derive(Serialize)]
struct InitializeUploadBody {
    owner: String,
}

#[derive(Deserialize)]
struct InitializeUploadResponse {
    value: UploadTarget,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    image: String,
}

#[derive(Deserialize)]
struct CreatedEntity {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialActionsResponse {
    impression_count: Option<i64>,
    like_count: Option<i64>,
    comment_count: Option<i64>,
    share_count: Option<i64>,
    click_count: Option<i64>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
}

/// OpenID Connect profile of the connected member
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInUser {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LinkedIn API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Failures only a new credential can fix
    pub fn is_credential_error(&self) -> bool {
        match self {
            GatewayError::Api { status, .. } => {
                *status == StatusCode::UNAUTHORIZED.as_u16()
                    || *status == StatusCode::FORBIDDEN.as_u16()
            }
            GatewayError::MissingRefreshToken => true,
            _ => false,
        }
    }

    /// Message worth showing to an operator, upstream text verbatim when present
    pub fn upstream_message(&self) -> String {
        match self {
            GatewayError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
