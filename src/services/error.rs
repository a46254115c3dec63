//! Error handling utilities for route handlers

use axum::http::StatusCode;

/// Log an error with context and turn it into a response status
pub trait LogErr<T> {
    /// Our own failure: log at error level, answer 500
    fn log_500(self, context: &str) -> Result<T, StatusCode>;

    /// The platform refused or failed: log at warn level, answer 502
    fn log_502(self, context: &str) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }

    fn log_502(self, context: &str) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::warn!(error = %e, "{}", context);
            StatusCode::BAD_GATEWAY
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let ok: Result<i32, String> = Ok(1);
        assert_eq!(ok.log_500("unused"), Ok(1));

        let failed: Result<i32, String> = Err("db down".to_string());
        assert_eq!(failed.log_500("query"), Err(StatusCode::INTERNAL_SERVER_ERROR));

        let rejected: Result<i32, String> = Err("invalid_grant".to_string());
        assert_eq!(rejected.log_502("exchange"), Err(StatusCode::BAD_GATEWAY));
    }
}
