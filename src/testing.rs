//! Fixtures and a scriptable gateway shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use crate::domain::content::{ContentKind, ContentRef, ContentSummary};
use crate::domain::social::{
    AccountType, EngagementCounts, NewSocialPost, Platform, PostAnalytics, PostStatus,
    SocialAccount, SocialPost, TokenGrant,
};
use crate::services::captions::TemplateCaptions;
use crate::services::deps::{PostingDeps, PostingPolicy};
use crate::services::events::PostEvents;
use crate::services::gateway::{PostingGateway, PublishedPost};
use crate::services::linkedin::{GatewayError, post_url};
use crate::store::memory::MemoryStore;

pub fn account(id: i64, expires_at: DateTime<Utc>) -> SocialAccount {
    let now = Utc::now();
    SocialAccount {
        id,
        user_id: 1,
        platform: Platform::LinkedIn,
        account_type: AccountType::Personal,
        external_account_id: format!("member-{}", id),
        organization_id: None,
        account_name: Some(format!("Member {}", id)),
        account_email: Some(format!("member{}@example.com", id)),
        profile_image_url: None,
        access_token: format!("access-{}", id),
        refresh_token: Some(format!("refresh-{}", id)),
        expires_at,
        scopes: vec!["w_member_social".to_string()],
        is_active: true,
        last_error: None,
        error_count: 0,
        last_synced_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A post promoting blog `id`
pub fn post(
    id: i64,
    account_id: i64,
    status: PostStatus,
    scheduled_at: Option<DateTime<Utc>>,
) -> SocialPost {
    let now = Utc::now();
    SocialPost {
        id,
        content_id: id,
        content_kind: ContentKind::Blog,
        platform: Platform::LinkedIn,
        social_account_id: account_id,
        created_by: 1,
        caption: format!("Post {}\n\nRead more: https://example.com/blog/post-{}", id, id),
        raw_caption: Some(format!("Post {}", id)),
        image_url: None,
        target_url: format!("https://example.com/blog/post-{}", id),
        hashtags: vec!["#Insights".to_string()],
        scheduled_at,
        posted_at: None,
        status,
        error_message: None,
        retry_count: 0,
        max_retries: 3,
        external_post_id: None,
        external_post_url: None,
        caption_generated: true,
        analytics: PostAnalytics::default(),
        created_at: now,
        updated_at: now,
    }
}

pub fn posted(id: i64, account_id: i64, posted_at: DateTime<Utc>) -> SocialPost {
    let urn = format!("urn:li:share:{}", id);
    SocialPost {
        posted_at: Some(posted_at),
        external_post_url: Some(post_url(&urn)),
        external_post_id: Some(urn),
        ..post(id, account_id, PostStatus::Posted, Some(posted_at))
    }
}

pub fn new_post(content: ContentRef, account_id: i64) -> NewSocialPost {
    NewSocialPost {
        content,
        platform: Platform::LinkedIn,
        social_account_id: account_id,
        created_by: 1,
        caption: "Fresh caption".to_string(),
        raw_caption: None,
        image_url: None,
        target_url: "https://example.com/blog/fresh".to_string(),
        hashtags: Vec::new(),
        scheduled_at: Some(Utc::now() + Duration::hours(1)),
        status: PostStatus::Scheduled,
        max_retries: 3,
        caption_generated: false,
    }
}

pub fn blog(id: i64) -> (ContentRef, ContentSummary) {
    (
        ContentRef {
            kind: ContentKind::Blog,
            id,
        },
        ContentSummary {
            title: format!("Post {}", id),
            slug: format!("post-{}", id),
            image: None,
            excerpt: Some("What we learned shipping it".to_string()),
            category: Some("engineering".to_string()),
        },
    )
}

/// Gateway double. Counts calls and fails or stalls on request.
pub struct MockGateway {
    pub publish_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub analytics_calls: AtomicUsize,
    pub fail_publish: AtomicBool,
    /// Status reported when `fail_publish` is set
    pub fail_status: AtomicU16,
    pub fail_refresh: AtomicBool,
    pub fail_analytics: AtomicBool,
    pub panic_publish: AtomicBool,
    /// Park every gateway call until `release` is notified
    pub hold_calls: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            publish_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            analytics_calls: AtomicUsize::new(0),
            fail_publish: AtomicBool::new(false),
            fail_status: AtomicU16::new(422),
            fail_refresh: AtomicBool::new(false),
            fail_analytics: AtomicBool::new(false),
            panic_publish: AtomicBool::new(false),
            hold_calls: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

impl MockGateway {
    async fn park(&self) {
        if self.hold_calls.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl PostingGateway for MockGateway {
    async fn publish(
        &self,
        post: &SocialPost,
        _account: &SocialAccount,
    ) -> Result<PublishedPost, GatewayError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);

        self.park().await;
        if self.panic_publish.load(Ordering::SeqCst) {
            panic!("publish exploded");
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: self.fail_status.load(Ordering::SeqCst),
                message: "Content is a duplicate".to_string(),
            });
        }

        let external_id = format!("urn:li:share:{}", post.id);
        Ok(PublishedPost {
            url: post_url(&external_id),
            external_id,
        })
    }

    async fn refresh_token(
        &self,
        account: &SocialAccount,
    ) -> Result<Option<TokenGrant>, GatewayError> {
        if !account.needs_refresh(Utc::now()) {
            return Ok(None);
        }
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.park().await;

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(Some(TokenGrant {
            access_token: format!("refreshed-{}", n),
            refresh_token: None,
            expires_at: Utc::now() + Duration::days(60),
        }))
    }

    async fn fetch_analytics(
        &self,
        _external_post_id: &str,
        _account: &SocialAccount,
    ) -> Result<EngagementCounts, GatewayError> {
        self.analytics_calls.fetch_add(1, Ordering::SeqCst);
        self.park().await;

        if self.fail_analytics.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 403,
                message: "Not enough permissions to access: socialActions".to_string(),
            });
        }
        Ok(EngagementCounts {
            impressions: 1000,
            likes: 40,
            comments: 5,
            shares: 5,
            clicks: 12,
        })
    }
}

/// Memory store and mock gateway wired into `PostingDeps`
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub deps: PostingDeps,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::default());
        let deps = PostingDeps {
            accounts: store.clone(),
            posts: store.clone(),
            settings: store.clone(),
            content: store.clone(),
            leases: store.clone(),
            gateway: gateway.clone(),
            captions: Arc::new(TemplateCaptions::default()),
            events: PostEvents::default(),
            policy: PostingPolicy {
                site_base_url: "https://example.com".to_string(),
                ..Default::default()
            },
        };
        Self {
            store,
            gateway,
            deps,
        }
    }
}
