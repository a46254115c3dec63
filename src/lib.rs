//! Scheduled social posting: account connections, the post lifecycle, and
//! the periodic workers that publish, refresh credentials and sync analytics.

pub mod config;
pub mod constants;
pub mod domain;
pub mod logging;
pub mod routes;
pub mod services;
pub mod store;
pub mod workers;

#[cfg(test)]
mod testing;

use services::deps::PostingDeps;
use services::linkedin::LinkedInClient;

/// Shared state for route handlers
#[derive(Clone)]
pub struct AppState {
    pub deps: PostingDeps,
    pub linkedin: LinkedInClient,
}
