//! Publishes scheduled posts once they come due

use std::time::Duration;

use chrono::Utc;

use super::guard::{TickGuard, TickOutcome};
use crate::constants::{DISPATCH_BATCH_SIZE, DISPATCH_DELAY_MS};
use crate::domain::social::{PostStatus, SocialPost};
use crate::services::deps::PostingDeps;
use crate::services::events::PostEvent;
use crate::services::publisher::{PublishOutcome, publish_claimed};
use crate::store::{ClaimOutcome, StoreError};

const INACTIVE_ACCOUNT_MESSAGE: &str = "LinkedIn account is no longer active";
const INTERRUPTED_MESSAGE: &str = "Publishing was interrupted before a result was recorded";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: i64,
    /// Minimum spacing between publish calls
    pub delay: Duration,
    /// Also pick up failed posts whose backoff has elapsed
    pub auto_retry: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DISPATCH_BATCH_SIZE,
            delay: Duration::from_millis(DISPATCH_DELAY_MS),
            auto_retry: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Posts moved into `posting` by this tick
    pub claimed: usize,
    pub posted: usize,
    pub failed: usize,
    /// Posts another actor claimed first, or retries whose account went away
    pub skipped: usize,
    /// Posts found stuck in `posting` and failed
    pub recovered: usize,
}

pub struct DispatchWorker {
    deps: PostingDeps,
    settings: DispatchSettings,
    guard: TickGuard,
}

impl DispatchWorker {
    pub fn new(deps: PostingDeps, settings: DispatchSettings, lease_ttl: chrono::Duration) -> Self {
        let guard = TickGuard::new("dispatch", deps.leases.clone(), lease_ttl);
        Self {
            deps,
            settings,
            guard,
        }
    }

    pub fn name(&self) -> &'static str {
        self.guard.name()
    }

    pub async fn tick(&self) -> TickOutcome<DispatchReport> {
        self.guard.run(|| self.dispatch_due()).await
    }

    async fn dispatch_due(&self) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::default();
        let now = Utc::now();
        report.recovered = self.recover_stale(now).await?;

        let due = self
            .deps
            .posts
            .list_due_posts(now, self.settings.batch_size)
            .await?;

        let mut batch: Vec<(SocialPost, PostStatus)> = due
            .into_iter()
            .map(|post| (post, PostStatus::Scheduled))
            .collect();

        let remaining = self.settings.batch_size - batch.len() as i64;
        if self.settings.auto_retry && remaining > 0 {
            let retries = self
                .deps
                .posts
                .list_retry_candidates(now, self.deps.policy.retry_backoff, remaining)
                .await?;
            batch.extend(retries.into_iter().map(|post| (post, PostStatus::Failed)));
        }

        let mut called = false;
        for (post, from) in batch {
            self.guard.renew().await?;
            let post_id = post.id;
            if let Err(e) = self.dispatch_one(post, from, &mut called, &mut report).await {
                tracing::error!(post_id, error = %e, "failed to dispatch post");
                report.failed += 1;
            }
        }

        if report != DispatchReport::default() {
            tracing::info!(
                claimed = report.claimed,
                posted = report.posted,
                failed = report.failed,
                skipped = report.skipped,
                recovered = report.recovered,
                "dispatch tick complete"
            );
        }
        Ok(report)
    }

    async fn dispatch_one(
        &self,
        post: SocialPost,
        from: PostStatus,
        called: &mut bool,
        report: &mut DispatchReport,
    ) -> Result<(), StoreError> {
        let account = self
            .deps
            .accounts
            .get_account(post.social_account_id)
            .await?
            .filter(|a| a.is_active);

        let Some(account) = account else {
            if from != PostStatus::Scheduled {
                report.skipped += 1;
                return Ok(());
            }
            if self
                .deps
                .posts
                .mark_failed(post.id, from, INACTIVE_ACCOUNT_MESSAGE)
                .await?
            {
                tracing::warn!(
                    post_id = post.id,
                    account_id = post.social_account_id,
                    "account inactive, failing post without publishing"
                );
                self.deps.events.emit(PostEvent::PostFailed {
                    social_post_id: post.id,
                    error: INACTIVE_ACCOUNT_MESSAGE.to_string(),
                });
                report.failed += 1;
            } else {
                report.skipped += 1;
            }
            return Ok(());
        };

        match self.deps.posts.claim_for_posting(post.id, from).await? {
            ClaimOutcome::Claimed => report.claimed += 1,
            ClaimOutcome::Lost => {
                tracing::debug!(post_id = post.id, "post claimed elsewhere");
                report.skipped += 1;
                return Ok(());
            }
            ClaimOutcome::Duplicate(existing) => {
                tracing::info!(
                    post_id = post.id,
                    active_post_id = existing,
                    "content already has an active post, not retrying"
                );
                report.skipped += 1;
                return Ok(());
            }
        }

        if *called && !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }
        *called = true;

        match publish_claimed(&self.deps, &post, account).await? {
            PublishOutcome::Posted(_) => report.posted += 1,
            PublishOutcome::Failed(_) => report.failed += 1,
            PublishOutcome::Lost => report.skipped += 1,
        }
        Ok(())
    }

    /// Fail posts left in `posting` longer than a lease lives; their tick is gone
    async fn recover_stale(&self, now: chrono::DateTime<Utc>) -> Result<usize, StoreError> {
        let stale = self
            .deps
            .posts
            .fail_stale_posting(now - self.guard.lease_ttl(), INTERRUPTED_MESSAGE)
            .await?;

        for &post_id in &stale {
            tracing::warn!(post_id, "post stuck in posting, marked failed");
            self.deps.events.emit(PostEvent::PostFailed {
                social_post_id: post_id,
                error: INTERRUPTED_MESSAGE.to_string(),
            });
        }
        Ok(stale.len())
    }
}
