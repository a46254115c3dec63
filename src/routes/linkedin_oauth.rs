//! LinkedIn account connection endpoints (/auth/linkedin/*)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::user_id_from_headers;
use crate::AppState;
use crate::services::accounts::{self, ConnectError};
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/linkedin", get(auth_linkedin))
        .route("/auth/linkedin/callback", get(auth_linkedin_callback))
}

#[derive(Serialize)]
struct AuthUrlResponse {
    url: String,
}

/// GET /auth/linkedin - Start OAuth flow, returns URL to redirect user to
async fn auth_linkedin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AuthUrlResponse>, StatusCode> {
    let user_id = user_id_from_headers(&headers)?;

    let url = accounts::start_connect(&state.deps, &state.linkedin, user_id)
        .await
        .log_500("Failed to save OAuth state")?;

    Ok(Json(AuthUrlResponse { url }))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct ConnectedResponse {
    account_id: i64,
    account_name: Option<String>,
}

/// GET /auth/linkedin/callback - Complete the handshake and store the account
async fn auth_linkedin_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<ConnectedResponse>, StatusCode> {
    if let Some(error) = query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "LinkedIn authorization denied"
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let account =
        match accounts::connect_account(&state.deps, &state.linkedin, &oauth_state, &code).await {
            Ok(account) => account,
            Err(ConnectError::InvalidState) => return Err(StatusCode::BAD_REQUEST),
            Err(ConnectError::Gateway(e)) => {
                return Err(e).log_502("LinkedIn token exchange failed");
            }
            Err(ConnectError::Store(e)) => {
                return Err(e).log_500("Failed to store LinkedIn account");
            }
        };

    Ok(Json(ConnectedResponse {
        account_id: account.id,
        account_name: account.account_name,
    }))
}
