use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    ACCOUNT_ERROR_THRESHOLD, ANALYTICS_BATCH_SIZE, ANALYTICS_CRON, ANALYTICS_DELAY_MS,
    ANALYTICS_INITIAL_DELAY_SECS, ANALYTICS_STALE_SECS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_LEASE_SECS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF_SECS, DISPATCH_BATCH_SIZE,
    DISPATCH_CRON, DISPATCH_DELAY_MS, DISPATCH_INITIAL_DELAY_SECS, TOKEN_REFRESH_CRON,
    TOKEN_REFRESH_DELAY_MS, TOKEN_REFRESH_INITIAL_DELAY_SECS,
};
use crate::domain::social::Platform;
use crate::services::deps::PostingPolicy;
use crate::services::linkedin::LinkedInConfig;
use crate::workers::analytics::AnalyticsSettings;
use crate::workers::dispatch::DispatchSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub linkedin: LinkedInConfig,
    pub policy: PostingPolicy,
    /// Always listed first in generated hashtags
    pub brand_hashtag: Option<String>,
    pub workers: WorkerConfig,
}

/// Schedules and tunables for the periodic workers
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub dispatch_cron: String,
    pub token_refresh_cron: String,
    pub analytics_cron: String,
    pub dispatch: DispatchSettings,
    pub analytics: AnalyticsSettings,
    pub token_refresh_delay: Duration,
    pub dispatch_initial_delay: Duration,
    pub token_refresh_initial_delay: Duration,
    pub analytics_initial_delay: Duration,
    pub lease_ttl: chrono::Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let site_base_url =
            env::var("SITE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5, |v| *v > 0),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            linkedin: LinkedInConfig {
                client_id: env::var("LINKEDIN_CLIENT_ID")
                    .context("LINKEDIN_CLIENT_ID must be set")?,
                client_secret: env::var("LINKEDIN_CLIENT_SECRET")
                    .context("LINKEDIN_CLIENT_SECRET must be set")?,
                redirect_uri: env::var("LINKEDIN_REDIRECT_URI").unwrap_or_else(|_| {
                    "http://localhost:3000/auth/linkedin/callback".to_string()
                }),
                api_base_url: env::var("LINKEDIN_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.linkedin.com".to_string()),
                oauth_base_url: env::var("LINKEDIN_OAUTH_BASE_URL")
                    .unwrap_or_else(|_| "https://www.linkedin.com".to_string()),
                api_version: env::var("LINKEDIN_API_VERSION")
                    .unwrap_or_else(|_| "202401".to_string()),
                timeout: Duration::from_secs(env_or(
                    "HTTP_TIMEOUT_SECS",
                    DEFAULT_HTTP_TIMEOUT_SECS,
                    |v| *v > 0,
                )),
            },
            policy: PostingPolicy {
                platform: Platform::LinkedIn,
                account_error_threshold: env_or(
                    "ACCOUNT_ERROR_THRESHOLD",
                    ACCOUNT_ERROR_THRESHOLD,
                    |v| *v > 0,
                ),
                max_retries: env_or("MAX_RETRIES", DEFAULT_MAX_RETRIES, |v| *v >= 0),
                site_base_url,
                retry_backoff: chrono::Duration::seconds(env_or(
                    "RETRY_BACKOFF_SECS",
                    DEFAULT_RETRY_BACKOFF_SECS,
                    |v| *v > 0,
                )),
            },
            brand_hashtag: env::var("BRAND_HASHTAG").ok().filter(|s| !s.is_empty()),
            workers: WorkerConfig::from_env(),
        })
    }
}

impl WorkerConfig {
    fn from_env() -> Self {
        Self {
            dispatch_cron: env::var("DISPATCH_CRON").unwrap_or_else(|_| DISPATCH_CRON.to_string()),
            token_refresh_cron: env::var("TOKEN_REFRESH_CRON")
                .unwrap_or_else(|_| TOKEN_REFRESH_CRON.to_string()),
            analytics_cron: env::var("ANALYTICS_CRON")
                .unwrap_or_else(|_| ANALYTICS_CRON.to_string()),
            dispatch: DispatchSettings {
                batch_size: env_or("DISPATCH_BATCH_SIZE", DISPATCH_BATCH_SIZE, |v| *v > 0),
                delay: millis("DISPATCH_DELAY_MS", DISPATCH_DELAY_MS),
                auto_retry: env_or("DISPATCH_AUTO_RETRY", false, |_| true),
            },
            analytics: AnalyticsSettings {
                batch_size: env_or("ANALYTICS_BATCH_SIZE", ANALYTICS_BATCH_SIZE, |v| *v > 0),
                delay: millis("ANALYTICS_DELAY_MS", ANALYTICS_DELAY_MS),
                stale_after: chrono::Duration::seconds(env_or(
                    "ANALYTICS_STALE_SECS",
                    ANALYTICS_STALE_SECS,
                    |v| *v > 0,
                )),
            },
            token_refresh_delay: millis("TOKEN_REFRESH_DELAY_MS", TOKEN_REFRESH_DELAY_MS),
            dispatch_initial_delay: secs(
                "DISPATCH_INITIAL_DELAY_SECS",
                DISPATCH_INITIAL_DELAY_SECS,
            ),
            token_refresh_initial_delay: secs(
                "TOKEN_REFRESH_INITIAL_DELAY_SECS",
                TOKEN_REFRESH_INITIAL_DELAY_SECS,
            ),
            analytics_initial_delay: secs(
                "ANALYTICS_INITIAL_DELAY_SECS",
                ANALYTICS_INITIAL_DELAY_SECS,
            ),
            lease_ttl: chrono::Duration::seconds(env_or(
                "WORKER_LEASE_SECS",
                DEFAULT_LEASE_SECS,
                |v| *v > 0,
            )),
        }
    }
}

/// Parsed `key`, or `default` when unset, unparsable or rejected by `valid`
fn env_or<T: FromStr>(key: &str, default: T, valid: impl Fn(&T) -> bool) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v| valid(v))
        .unwrap_or(default)
}

fn millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(env_or(key, default, |_| true))
}

fn secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_or(key, default, |_| true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("SOCIAL_DISPATCH_TEST_UNSET", 7i64, |v| *v > 0), 7);

        // SAFETY: the variable is unique to this test
        unsafe { env::set_var("SOCIAL_DISPATCH_TEST_ZERO", "0") };
        assert_eq!(env_or("SOCIAL_DISPATCH_TEST_ZERO", 7i64, |v| *v > 0), 7);

        unsafe { env::set_var("SOCIAL_DISPATCH_TEST_BAD", "soon") };
        assert_eq!(env_or("SOCIAL_DISPATCH_TEST_BAD", 7i64, |v| *v > 0), 7);

        unsafe { env::set_var("SOCIAL_DISPATCH_TEST_OK", " 12 ") };
        assert_eq!(env_or("SOCIAL_DISPATCH_TEST_OK", 7i64, |v| *v > 0), 12);
    }

    #[test]
    fn test_default_schedules_parse() {
        for expr in [DISPATCH_CRON, TOKEN_REFRESH_CRON, ANALYTICS_CRON] {
            assert!(apalis_cron::Schedule::from_str(expr).is_ok(), "{expr}");
        }
    }
}
