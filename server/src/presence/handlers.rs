use axum::{extract::State, Json};
use serde::Serialize;

use super::UserId;
use crate::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    #[serde(rename = "onlineUserIDs")]
    pub online_user_ids: Vec<UserId>,
}

/// GET /api/presence -- Users online right now, computed from the registry.
pub async fn get_online_users(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Json<OnlineUsersResponse> {
    Json(OnlineUsersResponse {
        online_user_ids: state.registry.online_user_ids(),
    })
}
