//! In-memory store for tests. Mirrors the conditional updates of the SQL queries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{
    AccountStore, ClaimOutcome, ContentSource, CreateOutcome, LeaseStore, PostStore,
    SettingsStore, StoreError,
};
use crate::domain::content::{ContentRef, ContentSummary};
use crate::domain::social::{
    NewSocialAccount, NewSocialPost, Platform, PostAnalytics, PostStatus, PostingSettings,
    SocialAccount, SocialPost, TokenGrant,
};

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<i64, SocialAccount>,
    posts: BTreeMap<i64, SocialPost>,
    settings: HashMap<i64, PostingSettings>,
    content: HashMap<ContentRef, ContentSummary>,
    leases: HashMap<String, (String, DateTime<Utc>)>,
    oauth_states: HashMap<String, i64>,
    /// Operations that fail once with a database error
    failing: HashSet<&'static str>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id + 1000
    }

    fn injected(&mut self, op: &'static str) -> Result<(), StoreError> {
        if self.failing.remove(op) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Active post other than `post` for the same content and platform
    fn active_sibling(&self, post: &SocialPost) -> Option<i64> {
        self.posts
            .values()
            .find(|p| {
                p.id != post.id
                    && p.content() == post.content()
                    && p.platform == post.platform
                    && p.status.blocks_duplicate()
            })
            .map(|p| p.id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `op` fail with a database error
    pub fn fail_once(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub fn insert_account(&self, account: SocialAccount) {
        let mut inner = self.inner.lock().unwrap();
        inner.accounts.insert(account.id, account);
    }

    pub fn insert_post(&self, post: SocialPost) {
        let mut inner = self.inner.lock().unwrap();
        inner.posts.insert(post.id, post);
    }

    pub fn insert_content(&self, content: ContentRef, summary: ContentSummary) {
        let mut inner = self.inner.lock().unwrap();
        inner.content.insert(content, summary);
    }

    pub fn insert_settings(&self, settings: PostingSettings) {
        let mut inner = self.inner.lock().unwrap();
        inner.settings.insert(settings.user_id, settings);
    }

    pub fn account(&self, account_id: i64) -> Option<SocialAccount> {
        self.inner.lock().unwrap().accounts.get(&account_id).cloned()
    }

    pub fn post(&self, post_id: i64) -> Option<SocialPost> {
        self.inner.lock().unwrap().posts.get(&post_id).cloned()
    }

    pub fn posts(&self) -> Vec<SocialPost> {
        self.inner.lock().unwrap().posts.values().cloned().collect()
    }

    pub fn settings(&self, user_id: i64) -> Option<PostingSettings> {
        self.inner.lock().unwrap().settings.get(&user_id).cloned()
    }

    pub fn lease_holder(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .leases
            .get(name)
            .map(|(holder, _)| holder.clone())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, account_id: i64) -> Result<Option<SocialAccount>, StoreError> {
        Ok(self.account(account_id))
    }

    async fn list_refreshable_accounts(
        &self,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .accounts
            .values()
            .filter(|a| a.platform == platform && a.is_active && a.refresh_token.is_some())
            .cloned()
            .collect())
    }

    async fn list_active_accounts(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut accounts: Vec<SocialAccount> = inner
            .accounts
            .values()
            .filter(|a| a.user_id == user_id && a.platform == platform && a.is_active)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        Ok(accounts)
    }

    async fn store_refreshed_tokens(
        &self,
        account_id: i64,
        grant: &TokenGrant,
    ) -> Result<Option<SocialAccount>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.injected("store_refreshed_tokens")?;
        let Some(account) = inner.accounts.get_mut(&account_id) else {
            return Ok(None);
        };
        *account = account.clone().with_grant(grant);
        account.last_synced_at = Some(Utc::now());
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn record_account_error(
        &self,
        account_id: i64,
        error: &str,
        threshold: i32,
    ) -> Result<Option<SocialAccount>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.injected("record_account_error")?;
        let Some(account) = inner.accounts.get_mut(&account_id) else {
            return Ok(None);
        };
        account.last_error = Some(error.to_string());
        account.error_count += 1;
        if account.error_count >= threshold {
            account.is_active = false;
        }
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn upsert_account(&self, new: &NewSocialAccount) -> Result<SocialAccount, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let existing = inner
            .accounts
            .values()
            .find(|a| {
                a.user_id == new.user_id
                    && a.platform == new.platform
                    && a.external_account_id == new.external_account_id
            })
            .map(|a| a.id);

        let id = match existing {
            Some(id) => id,
            None => inner.next_id(),
        };
        let previous = inner.accounts.get(&id).cloned();
        let account = SocialAccount {
            id,
            user_id: new.user_id,
            platform: new.platform,
            account_type: new.account_type,
            external_account_id: new.external_account_id.clone(),
            organization_id: previous.as_ref().and_then(|p| p.organization_id.clone()),
            account_name: new.account_name.clone(),
            account_email: new.account_email.clone(),
            profile_image_url: new.profile_image_url.clone(),
            access_token: new.grant.access_token.clone(),
            refresh_token: new
                .grant
                .refresh_token
                .clone()
                .or_else(|| previous.as_ref().and_then(|p| p.refresh_token.clone())),
            expires_at: new.grant.expires_at,
            scopes: new.scopes.clone(),
            is_active: true,
            last_error: None,
            error_count: 0,
            last_synced_at: previous.as_ref().and_then(|p| p.last_synced_at),
            created_at: previous.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };
        inner.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn delete_account(&self, account_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let owned = inner
            .accounts
            .get(&account_id)
            .is_some_and(|a| a.user_id == user_id);
        if owned {
            inner.accounts.remove(&account_id);
        }
        Ok(owned)
    }

    async fn save_oauth_state(&self, state: &str, user_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.oauth_states.insert(state.to_string(), user_id);
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<i64>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.oauth_states.remove(state))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, new: &NewSocialPost) -> Result<CreateOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if new.status.blocks_duplicate() {
            let existing = inner.posts.values().find(|p| {
                p.content() == new.content
                    && p.platform == new.platform
                    && p.status.blocks_duplicate()
            });
            if let Some(existing) = existing {
                return Ok(CreateOutcome::Duplicate(existing.id));
            }
        }

        let id = inner.next_id();
        let now = Utc::now();
        let post = SocialPost {
            id,
            content_id: new.content.id,
            content_kind: new.content.kind,
            platform: new.platform,
            social_account_id: new.social_account_id,
            created_by: new.created_by,
            caption: new.caption.clone(),
            raw_caption: new.raw_caption.clone(),
            image_url: new.image_url.clone(),
            target_url: new.target_url.clone(),
            hashtags: new.hashtags.clone(),
            scheduled_at: new.scheduled_at,
            posted_at: None,
            status: new.status,
            error_message: None,
            retry_count: 0,
            max_retries: new.max_retries,
            external_post_id: None,
            external_post_url: None,
            caption_generated: new.caption_generated,
            analytics: PostAnalytics::default(),
            created_at: now,
            updated_at: now,
        };
        inner.posts.insert(id, post.clone());
        Ok(CreateOutcome::Created(post))
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<SocialPost>, StoreError> {
        Ok(self.post(post_id))
    }

    async fn list_due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<SocialPost> = inner
            .posts
            .values()
            .filter(|p| {
                p.status == PostStatus::Scheduled && p.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|p| (p.scheduled_at, p.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn list_retry_candidates(
        &self,
        now: DateTime<Utc>,
        backoff_base: Duration,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut candidates: Vec<SocialPost> = inner
            .posts
            .values()
            .filter(|p| {
                p.can_retry()
                    && p.retry_due_at(backoff_base) <= now
                    && inner.active_sibling(p).is_none()
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|p| (p.updated_at, p.id));
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn list_analytics_due(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SocialPost>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<SocialPost> = inner
            .posts
            .values()
            .filter(|p| {
                p.status == PostStatus::Posted
                    && p.external_post_id.is_some()
                    && p.analytics
                        .last_synced_at
                        .is_none_or(|synced| synced <= stale_before)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| b.posted_at.cmp(&a.posted_at).then(b.id.cmp(&a.id)));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_for_posting(
        &self,
        post_id: i64,
        from: PostStatus,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(current) = inner.posts.get(&post_id).cloned() else {
            return Ok(ClaimOutcome::Lost);
        };
        if let Some(existing) = inner.active_sibling(&current) {
            return Ok(ClaimOutcome::Duplicate(existing));
        }
        let claimable = current.status == from
            && from.can_transition_to(PostStatus::Posting)
            && (from != PostStatus::Failed || current.retry_count < current.max_retries);
        if !claimable {
            return Ok(ClaimOutcome::Lost);
        }

        if let Some(post) = inner.posts.get_mut(&post_id) {
            post.status = PostStatus::Posting;
            post.error_message = None;
            post.updated_at = Utc::now();
        }
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_posted(
        &self,
        post_id: i64,
        external_post_id: &str,
        external_post_url: &str,
        posted_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.injected("mark_posted")?;
        let Some(post) = inner.posts.get_mut(&post_id) else {
            return Ok(false);
        };
        if post.status != PostStatus::Posting {
            return Ok(false);
        }
        post.status = PostStatus::Posted;
        post.external_post_id = Some(external_post_id.to_string());
        post.external_post_url = Some(external_post_url.to_string());
        post.posted_at = Some(posted_at);
        post.error_message = None;
        post.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(
        &self,
        post_id: i64,
        from: PostStatus,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(post) = inner.posts.get_mut(&post_id) else {
            return Ok(false);
        };
        if post.status != from || !from.can_transition_to(PostStatus::Failed) {
            return Ok(false);
        }
        post.status = PostStatus::Failed;
        post.error_message = Some(error_message.to_string());
        post.retry_count = (post.retry_count + 1).min(post.max_retries);
        post.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed_final(
        &self,
        post_id: i64,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(post) = inner.posts.get_mut(&post_id) else {
            return Ok(false);
        };
        if post.status != PostStatus::Posting {
            return Ok(false);
        }
        post.status = PostStatus::Failed;
        post.error_message = Some(error_message.to_string());
        post.retry_count = post.max_retries;
        post.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail_stale_posting(
        &self,
        stale_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut failed = Vec::new();
        for post in inner.posts.values_mut() {
            if post.status == PostStatus::Posting && post.updated_at < stale_before {
                post.status = PostStatus::Failed;
                post.error_message = Some(error_message.to_string());
                post.retry_count = (post.retry_count + 1).min(post.max_retries);
                post.updated_at = now;
                failed.push(post.id);
            }
        }
        Ok(failed)
    }

    async fn record_analytics(
        &self,
        post_id: i64,
        analytics: &PostAnalytics,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(post) = inner.posts.get_mut(&post_id) else {
            return Ok(false);
        };
        if post.status != PostStatus::Posted {
            return Ok(false);
        }
        post.analytics = analytics.clone();
        Ok(true)
    }

    async fn delete_post(&self, post_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let deletable = inner
            .posts
            .get(&post_id)
            .is_some_and(|p| p.created_by == user_id && p.status.is_deletable());
        if deletable {
            inner.posts.remove(&post_id);
        }
        Ok(deletable)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self, user_id: i64) -> Result<Option<PostingSettings>, StoreError> {
        Ok(self.settings(user_id))
    }

    async fn set_default_account(
        &self,
        user_id: i64,
        account_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let settings = inner
            .settings
            .entry(user_id)
            .or_insert_with(|| PostingSettings::defaults_for(user_id));
        settings.default_account_id = account_id;
        settings.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_default_account(&self, account_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for settings in inner.settings.values_mut() {
            if settings.default_account_id == Some(account_id) {
                settings.default_account_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentSource for MemoryStore {
    async fn get_content(
        &self,
        item: ContentRef,
    ) -> Result<Option<ContentSummary>, StoreError> {
        Ok(self.inner.lock().unwrap().content.get(&item).cloned())
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let free = match inner.leases.get(name) {
            None => true,
            Some((current, until)) => *until < now || current == holder,
        };
        if free {
            inner
                .leases
                .insert(name.to_string(), (holder.to_string(), now + ttl));
        }
        Ok(free)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .leases
            .get(name)
            .is_some_and(|(current, _)| current == holder)
        {
            inner.leases.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content::ContentKind;
    use crate::testing::{account, new_post, post};

    #[tokio::test]
    async fn test_duplicate_guard_ignores_failed_posts() {
        let store = MemoryStore::new();
        let mut failed = post(1, 1, PostStatus::Failed, None);
        failed.content_id = 42;
        store.insert_post(failed);

        let content = ContentRef {
            kind: ContentKind::Blog,
            id: 42,
        };
        let first = store.create_post(&new_post(content, 1)).await.unwrap();
        let CreateOutcome::Created(created) = first else {
            panic!("expected a new post");
        };

        let second = store.create_post(&new_post(content, 1)).await.unwrap();
        assert!(matches!(second, CreateOutcome::Duplicate(id) if id == created.id));
    }

    #[tokio::test]
    async fn test_claim_is_conditional() {
        let store = MemoryStore::new();
        store.insert_post(post(1, 1, PostStatus::Scheduled, Some(Utc::now())));

        assert_eq!(
            store.claim_for_posting(1, PostStatus::Scheduled).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            store.claim_for_posting(1, PostStatus::Scheduled).await.unwrap(),
            ClaimOutcome::Lost
        );

        assert!(store.mark_posted(1, "urn:li:share:1", "url", Utc::now()).await.unwrap());
        assert!(!store.mark_failed(1, PostStatus::Posting, "late").await.unwrap());
        assert_eq!(
            store.claim_for_posting(1, PostStatus::Posted).await.unwrap(),
            ClaimOutcome::Lost
        );
        assert_eq!(store.post(1).unwrap().status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_failed_post_is_not_claimed_over_an_active_sibling() {
        let store = MemoryStore::new();
        let mut failed = post(1, 1, PostStatus::Failed, None);
        failed.retry_count = 1;
        failed.updated_at = Utc::now() - Duration::hours(1);
        store.insert_post(failed);

        let mut active = post(2, 1, PostStatus::Posted, None);
        active.content_id = 1;
        store.insert_post(active);

        assert_eq!(
            store.claim_for_posting(1, PostStatus::Failed).await.unwrap(),
            ClaimOutcome::Duplicate(2)
        );
        assert_eq!(store.post(1).unwrap().status, PostStatus::Failed);

        let candidates = store
            .list_retry_candidates(Utc::now(), Duration::minutes(5), 10)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_stale_posting_is_failed() {
        let store = MemoryStore::new();
        let mut stuck = post(1, 1, PostStatus::Posting, None);
        stuck.updated_at = Utc::now() - Duration::hours(1);
        store.insert_post(stuck);
        store.insert_post(post(2, 1, PostStatus::Posting, None));

        let failed = store
            .fail_stale_posting(Utc::now() - Duration::minutes(15), "interrupted")
            .await
            .unwrap();
        assert_eq!(failed, vec![1]);

        let stored = store.post(1).unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(store.post(2).unwrap().status, PostStatus::Posting);
    }

    #[tokio::test]
    async fn test_lease_exclusion() {
        let store = MemoryStore::new();
        let ttl = Duration::minutes(5);

        assert!(store.try_acquire("dispatch", "a", ttl).await.unwrap());
        assert!(!store.try_acquire("dispatch", "b", ttl).await.unwrap());
        assert!(store.try_acquire("analytics", "b", ttl).await.unwrap());

        store.release("dispatch", "b").await.unwrap();
        assert_eq!(store.lease_holder("dispatch").as_deref(), Some("a"));

        store.release("dispatch", "a").await.unwrap();
        assert!(store.try_acquire("dispatch", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let store = MemoryStore::new();
        assert!(
            store
                .try_acquire("refresh", "a", Duration::seconds(-1))
                .await
                .unwrap()
        );
        assert!(
            store
                .try_acquire("refresh", "b", Duration::minutes(5))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_account_error_threshold() {
        let store = MemoryStore::new();
        let mut acc = account(1, Utc::now());
        acc.error_count = 3;
        store.insert_account(acc);

        let updated = store.record_account_error(1, "boom", 5).await.unwrap().unwrap();
        assert_eq!(updated.error_count, 4);
        assert!(updated.is_active);

        let updated = store.record_account_error(1, "boom", 5).await.unwrap().unwrap();
        assert_eq!(updated.error_count, 5);
        assert!(!updated.is_active);
    }
}
