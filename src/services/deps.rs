//! Collaborators shared by the posting operations and the workers

use std::sync::Arc;

use chrono::Duration;

use super::captions::CaptionSource;
use super::events::PostEvents;
use super::gateway::PostingGateway;
use crate::constants::{
    ACCOUNT_ERROR_THRESHOLD, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF_SECS,
};
use crate::domain::social::Platform;
use crate::store::{AccountStore, ContentSource, LeaseStore, PgStore, PostStore, SettingsStore};

/// Tunables that shape state transitions
#[derive(Debug, Clone)]
pub struct PostingPolicy {
    pub platform: Platform,
    /// Consecutive account failures before the account is deactivated
    pub account_error_threshold: i32,
    /// Publish attempts allowed per post
    pub max_retries: i32,
    /// Public site the content lives on, e.g. `https://example.com`
    pub site_base_url: String,
    /// First automated retry delay; doubles per failed attempt
    pub retry_backoff: Duration,
}

impl Default for PostingPolicy {
    fn default() -> Self {
        Self {
            platform: Platform::LinkedIn,
            account_error_threshold: ACCOUNT_ERROR_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
            site_base_url: "http://localhost:3000".to_string(),
            retry_backoff: Duration::seconds(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }
}

#[derive(Clone)]
pub struct PostingDeps {
    pub accounts: Arc<dyn AccountStore>,
    pub posts: Arc<dyn PostStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub content: Arc<dyn ContentSource>,
    pub leases: Arc<dyn LeaseStore>,
    pub gateway: Arc<dyn PostingGateway>,
    pub captions: Arc<dyn CaptionSource>,
    pub events: PostEvents,
    pub policy: PostingPolicy,
}

impl PostingDeps {
    /// Wire every store seam to one Postgres store
    pub fn postgres(
        store: PgStore,
        gateway: Arc<dyn PostingGateway>,
        captions: Arc<dyn CaptionSource>,
        events: PostEvents,
        policy: PostingPolicy,
    ) -> Self {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            posts: store.clone(),
            settings: store.clone(),
            content: store.clone(),
            leases: store,
            gateway,
            captions,
            events,
            policy,
        }
    }
}
