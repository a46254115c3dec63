//! Periodic engagement sync for published posts

use std::time::Duration;

use chrono::Utc;

use super::guard::{TickGuard, TickOutcome};
use crate::constants::{ANALYTICS_BATCH_SIZE, ANALYTICS_DELAY_MS, ANALYTICS_STALE_SECS};
use crate::services::analytics::sync_post;
use crate::services::deps::PostingDeps;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub batch_size: i64,
    pub delay: Duration,
    /// Snapshots older than this are refreshed
    pub stale_after: chrono::Duration,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            batch_size: ANALYTICS_BATCH_SIZE,
            delay: Duration::from_millis(ANALYTICS_DELAY_MS),
            stale_after: chrono::Duration::seconds(ANALYTICS_STALE_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsReport {
    pub synced: usize,
    pub failed: usize,
}

pub struct AnalyticsWorker {
    deps: PostingDeps,
    settings: AnalyticsSettings,
    guard: TickGuard,
}

impl AnalyticsWorker {
    pub fn new(
        deps: PostingDeps,
        settings: AnalyticsSettings,
        lease_ttl: chrono::Duration,
    ) -> Self {
        let guard = TickGuard::new("analytics", deps.leases.clone(), lease_ttl);
        Self {
            deps,
            settings,
            guard,
        }
    }

    pub fn name(&self) -> &'static str {
        self.guard.name()
    }

    pub async fn tick(&self) -> TickOutcome<AnalyticsReport> {
        self.guard.run(|| self.sync_stale()).await
    }

    async fn sync_stale(&self) -> Result<AnalyticsReport, StoreError> {
        let stale_before = Utc::now() - self.settings.stale_after;
        let posts = self
            .deps
            .posts
            .list_analytics_due(stale_before, self.settings.batch_size)
            .await?;

        let mut report = AnalyticsReport::default();
        for (i, post) in posts.iter().enumerate() {
            self.guard.renew().await?;
            if i > 0 && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }

            match sync_post(&self.deps, post).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    tracing::warn!(post_id = post.id, error = %e, "analytics sync failed");
                    report.failed += 1;
                }
            }
        }

        if report != AnalyticsReport::default() {
            tracing::info!(
                synced = report.synced,
                failed = report.failed,
                "analytics sync complete"
            );
        }
        Ok(report)
    }
}
