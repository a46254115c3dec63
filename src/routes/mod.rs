pub mod health;
pub mod linkedin_oauth;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(linkedin_oauth::routes())
}

/// Extract user_id from the X-User-Id header set by the frontend session layer
pub fn user_id_from_headers(headers: &HeaderMap) -> Result<i64, StatusCode> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or(StatusCode::UNAUTHORIZED)
}
