//! Social posting domain - models and queries for connected accounts and posts

pub mod models;
pub mod queries;

// Re-export models for convenience
pub use models::*;

// Re-export query modules
pub use queries::{accounts, leases, posts, settings};
