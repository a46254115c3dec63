pub mod accounts;
pub mod analytics;
pub mod captions;
pub mod deps;
pub mod error;
pub mod events;
pub mod gateway;
pub mod linkedin;
pub mod posts;
pub mod publisher;
pub mod tokens;
