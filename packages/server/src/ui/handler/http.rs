//! Read-only HTTP endpoints.
//!
//! The CRUD surface of the platform lives in the main application; the
//! gateway only exposes liveness and point-in-time presence reads.

use std::sync::Arc;

use axum::{Json, extract::Path, extract::State};
use serde::Serialize;

use crate::domain::UserId;

use super::super::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceListDto {
    pub online: Vec<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresenceDto {
    pub user_id: UserId,
    pub online: bool,
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

/// List all currently online users
pub async fn get_online_users(State(state): State<Arc<AppState>>) -> Json<PresenceListDto> {
    let mut online = state.gateway.online_users().await;
    // Sorted for stable output
    online.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Json(PresenceListDto { online })
}

/// Point-in-time presence of a single user
pub async fn get_user_presence(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<UserPresenceDto> {
    let user_id = UserId::new(user_id);
    let online = state.gateway.is_online(&user_id).await;
    Json(UserPresenceDto { user_id, online })
}
