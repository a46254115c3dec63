//! Refreshes credentials before they expire

use std::time::Duration;

use chrono::Utc;

use super::guard::{TickGuard, TickOutcome};
use crate::services::deps::PostingDeps;
use crate::services::tokens;
use crate::store::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    /// Accounts outside the refresh window
    pub skipped: usize,
    pub failed: usize,
}

pub struct TokenRefreshWorker {
    deps: PostingDeps,
    delay: Duration,
    guard: TickGuard,
}

impl TokenRefreshWorker {
    pub fn new(deps: PostingDeps, delay: Duration, lease_ttl: chrono::Duration) -> Self {
        let guard = TickGuard::new("token-refresh", deps.leases.clone(), lease_ttl);
        Self { deps, delay, guard }
    }

    pub fn name(&self) -> &'static str {
        self.guard.name()
    }

    pub async fn tick(&self) -> TickOutcome<RefreshReport> {
        self.guard.run(|| self.refresh_expiring()).await
    }

    async fn refresh_expiring(&self) -> Result<RefreshReport, StoreError> {
        let accounts = self
            .deps
            .accounts
            .list_refreshable_accounts(self.deps.policy.platform)
            .await?;

        let now = Utc::now();
        let mut report = RefreshReport::default();
        let mut called = false;

        for account in accounts {
            if !account.needs_refresh(now) {
                report.skipped += 1;
                continue;
            }

            self.guard.renew().await?;
            if called && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            called = true;

            let account_id = account.id;
            match tokens::refresh_if_needed(&self.deps, account).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    tracing::warn!(account_id, error = %e, "could not refresh account");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            refreshed = report.refreshed,
            skipped = report.skipped,
            failed = report.failed,
            "token refresh complete"
        );
        Ok(report)
    }
}
