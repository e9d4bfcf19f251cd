use axum::{extract::State, Extension, Json};
use chrono::Utc;

use crate::auth::middleware::AuthUser;
use crate::dto::DashboardResponse;
use crate::error::AppResult;
use crate::AppState;

/// Greeting, totals and the latest previews for the signed-in user.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DashboardResponse>> {
    let entries = state.entries.list_by_owner(auth_user.id, None).await?;
    tracing::debug!(user_id = %auth_user.id, total = entries.len(), "Dashboard loaded");

    Ok(Json(DashboardResponse::build(
        &auth_user.identity,
        &entries,
        Utc::now(),
    )))
}
