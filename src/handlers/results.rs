use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;

use crate::auth::middleware::AuthUser;
use crate::dto::ResultsView;
use crate::error::{AppError, AppResult};
use crate::models::entry::ResultsQuery;
use crate::AppState;

/// Results for `entry_id`, or for the most recent entry when none is given.
pub async fn get_results(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ResultsQuery>,
) -> AppResult<Json<ResultsView>> {
    let entries = state.entries.list_by_owner(auth_user.id, None).await?;

    let entry = match query.entry_id {
        Some(id) => Some(
            entries
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Entry {id}")))?,
        ),
        None => entries.first().cloned(),
    };

    Ok(Json(ResultsView::build(entry, Some(entries.as_slice()), Utc::now())))
}
