//! Periodic workers driven by apalis cron streams
//!
//! Each worker fires on its own schedule and guards itself against overlap,
//! so the three may run side by side. Each also gets one delayed pass after
//! startup.

use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;
use crate::services::deps::PostingDeps;

pub mod analytics;
pub mod dispatch;
pub mod guard;
pub mod token_refresh;

use analytics::AnalyticsWorker;
use dispatch::DispatchWorker;
use guard::TickOutcome;
use token_refresh::TokenRefreshWorker;

/// Job input, a marker carrying the fire time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tick {
    pub fired_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for Tick {
    fn from(dt: DateTime<Utc>) -> Self {
        Tick { fired_at: dt }
    }
}

/// The three periodic workers. Cheap to clone; ticks may also be triggered manually.
#[derive(Clone)]
pub struct Workers {
    pub dispatch: Arc<DispatchWorker>,
    pub token_refresh: Arc<TokenRefreshWorker>,
    pub analytics: Arc<AnalyticsWorker>,
}

impl Workers {
    pub fn new(deps: &PostingDeps, config: &WorkerConfig) -> Self {
        Self {
            dispatch: Arc::new(DispatchWorker::new(
                deps.clone(),
                config.dispatch.clone(),
                config.lease_ttl,
            )),
            token_refresh: Arc::new(TokenRefreshWorker::new(
                deps.clone(),
                config.token_refresh_delay,
                config.lease_ttl,
            )),
            analytics: Arc::new(AnalyticsWorker::new(
                deps.clone(),
                config.analytics.clone(),
                config.lease_ttl,
            )),
        }
    }
}

fn log_outcome<R: Debug>(worker: &str, outcome: &TickOutcome<R>) {
    match outcome {
        TickOutcome::Completed(report) => tracing::debug!(worker, ?report, "tick finished"),
        TickOutcome::Skipped(reason) => tracing::debug!(worker, ?reason, "tick skipped"),
        // Already logged by the guard
        TickOutcome::Aborted(_) => {}
    }
}

/// Job handlers always return Ok; failures are logged and retried next tick
async fn run_dispatch(_tick: Tick, worker: Data<Arc<DispatchWorker>>) -> Result<(), Error> {
    log_outcome(worker.name(), &worker.tick().await);
    Ok(())
}

async fn run_token_refresh(
    _tick: Tick,
    worker: Data<Arc<TokenRefreshWorker>>,
) -> Result<(), Error> {
    log_outcome(worker.name(), &worker.tick().await);
    Ok(())
}

async fn run_analytics(_tick: Tick, worker: Data<Arc<AnalyticsWorker>>) -> Result<(), Error> {
    log_outcome(worker.name(), &worker.tick().await);
    Ok(())
}

fn schedule(name: &str, expr: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(expr).with_context(|| format!("invalid {} schedule: {}", name, expr))
}

/// Run `tick` once after `delay`
fn spawn_initial_pass<F, Fut>(name: &'static str, delay: Duration, tick: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::info!(worker = name, "running startup pass");
        tick().await;
    });
}

/// Start the workers. Runs until the monitor stops.
pub async fn run_workers(workers: Workers, config: WorkerConfig) -> anyhow::Result<()> {
    let dispatch_schedule = schedule("dispatch", &config.dispatch_cron)?;
    let refresh_schedule = schedule("token refresh", &config.token_refresh_cron)?;
    let analytics_schedule = schedule("analytics", &config.analytics_cron)?;

    {
        let worker = workers.dispatch.clone();
        spawn_initial_pass("dispatch", config.dispatch_initial_delay, move || async move {
            log_outcome(worker.name(), &worker.tick().await);
        });
    }
    {
        let worker = workers.token_refresh.clone();
        spawn_initial_pass(
            "token-refresh",
            config.token_refresh_initial_delay,
            move || async move {
                log_outcome(worker.name(), &worker.tick().await);
            },
        );
    }
    {
        let worker = workers.analytics.clone();
        spawn_initial_pass(
            "analytics",
            config.analytics_initial_delay,
            move || async move {
                log_outcome(worker.name(), &worker.tick().await);
            },
        );
    }

    tracing::info!(
        dispatch = %config.dispatch_cron,
        token_refresh = %config.token_refresh_cron,
        analytics = %config.analytics_cron,
        batch_size = config.dispatch.batch_size,
        auto_retry = config.dispatch.auto_retry,
        "starting workers"
    );

    let dispatch = WorkerBuilder::new("dispatch-worker")
        .data(workers.dispatch)
        .backend(CronStream::new(dispatch_schedule))
        .build_fn(run_dispatch);

    let token_refresh = WorkerBuilder::new("token-refresh-worker")
        .data(workers.token_refresh)
        .backend(CronStream::new(refresh_schedule))
        .build_fn(run_token_refresh);

    let analytics = WorkerBuilder::new("analytics-worker")
        .data(workers.analytics)
        .backend(CronStream::new(analytics_schedule))
        .build_fn(run_analytics);

    Monitor::new()
        .register(dispatch)
        .register(token_refresh)
        .register(analytics)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("worker monitor failed: {:?}", e))
}
