//! Keeps a periodic worker from overlapping itself.
//!
//! Two layers: an in-process flag so a slow tick makes the next one skip, and
//! a `worker_leases` row so the same holds across instances. Both are released
//! even when the tick body panics. Long ticks renew the lease as they go.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration;
use futures::FutureExt;
use rand::Rng;

use crate::store::{LeaseStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// This process is still running the previous tick
    AlreadyRunning,
    /// Another instance holds the lease
    LeaseHeld,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome<R> {
    Completed(R),
    Skipped(SkipReason),
    /// The tick ended early; the reason has been logged
    Aborted(String),
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// Held while a tick runs; dropping it lets the next tick in
pub struct FlightPermit<'a> {
    running: &'a AtomicBool,
}

impl SingleFlight {
    pub fn try_begin(&self) -> Option<FlightPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                running: &self.running,
            })
    }
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct TickGuard {
    name: &'static str,
    holder: String,
    lease_ttl: Duration,
    leases: Arc<dyn LeaseStore>,
    flight: SingleFlight,
}

impl TickGuard {
    pub fn new(name: &'static str, leases: Arc<dyn LeaseStore>, lease_ttl: Duration) -> Self {
        let suffix: u32 = rand::rng().random();
        Self {
            name,
            holder: format!("{}-{}-{:08x}", name, std::process::id(), suffix),
            lease_ttl,
            leases,
            flight: SingleFlight::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Push the lease out by another TTL. Fails once another instance has
    /// taken the lease over.
    pub async fn renew(&self) -> Result<(), StoreError> {
        if self
            .leases
            .try_acquire(self.name, &self.holder, self.lease_ttl)
            .await?
        {
            return Ok(());
        }
        tracing::warn!(worker = self.name, "worker lease lost mid-tick");
        Err(StoreError::Conflict(format!("{} lease lost", self.name)))
    }

    /// Run `body` unless a previous tick is still going here or elsewhere
    pub async fn run<R, E, F, Fut>(&self, body: F) -> TickOutcome<R>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let Some(_permit) = self.flight.try_begin() else {
            tracing::info!(worker = self.name, "previous tick still running, skipping");
            return TickOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        match self
            .leases
            .try_acquire(self.name, &self.holder, self.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(worker = self.name, "lease held by another instance, skipping");
                return TickOutcome::Skipped(SkipReason::LeaseHeld);
            }
            Err(e) => {
                tracing::error!(worker = self.name, error = %e, "failed to acquire worker lease");
                return TickOutcome::Aborted(e.to_string());
            }
        }

        let result = AssertUnwindSafe(body()).catch_unwind().await;

        if let Err(e) = self.leases.release(self.name, &self.holder).await {
            tracing::warn!(worker = self.name, error = %e, "failed to release worker lease");
        }

        match result {
            Ok(Ok(report)) => TickOutcome::Completed(report),
            Ok(Err(e)) => {
                tracing::error!(worker = self.name, error = %e, "tick failed");
                TickOutcome::Aborted(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(&*panic);
                tracing::error!(worker = self.name, panic = %reason, "tick panicked");
                TickOutcome::Aborted(reason)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
