//! Application constants

/// Credentials expiring within this many hours are refreshed proactively
pub const REFRESH_WINDOW_HOURS: i64 = 24;

/// Consecutive credential failures before an account is retired
pub const ACCOUNT_ERROR_THRESHOLD: i32 = 5;

/// Publish attempts allowed per post before it needs operator intervention
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// LinkedIn's commentary limit
pub const MAX_CAPTION_CHARS: usize = 3000;

/// Scheduled posts claimed per dispatch tick
pub const DISPATCH_BATCH_SIZE: i64 = 10;

/// Posts refreshed per analytics sync run
pub const ANALYTICS_BATCH_SIZE: i64 = 50;

/// Analytics are re-synced once older than this (6 hours)
pub const ANALYTICS_STALE_SECS: i64 = 6 * 60 * 60;

/// Spacing between publish calls within one tick
pub const DISPATCH_DELAY_MS: u64 = 2_000;

/// Spacing between token exchanges within one refresh run
pub const TOKEN_REFRESH_DELAY_MS: u64 = 1_000;

/// Spacing between analytics reads within one sync run
pub const ANALYTICS_DELAY_MS: u64 = 1_000;

/// Worker lease lifetime; a crashed holder blocks the worker at most this long
pub const DEFAULT_LEASE_SECS: i64 = 15 * 60;

/// Base delay before a failed post becomes eligible for automatic retry
pub const DEFAULT_RETRY_BACKOFF_SECS: i64 = 5 * 60;

/// OAuth state rows older than this are rejected
pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Per-request timeout for LinkedIn calls
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Preview text length used for link attachments
pub const PREVIEW_CHARS: usize = 200;

/// Every minute
pub const DISPATCH_CRON: &str = "0 * * * * *";

/// Daily at 03:00 UTC
pub const TOKEN_REFRESH_CRON: &str = "0 0 3 * * *";

/// Every 6 hours
pub const ANALYTICS_CRON: &str = "0 0 */6 * * *";

/// Startup passes run this long after boot
pub const DISPATCH_INITIAL_DELAY_SECS: u64 = 5;
pub const TOKEN_REFRESH_INITIAL_DELAY_SECS: u64 = 15 * 60;
pub const ANALYTICS_INITIAL_DELAY_SECS: u64 = 10 * 60;
