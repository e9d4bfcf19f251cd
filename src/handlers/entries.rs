use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;

use crate::auth::middleware::AuthUser;
use crate::dto::ResultsView;
use crate::error::{AppError, AppResult};
use crate::models::entry::{CreateEntryRequest, DiaryEntry, EntryListQuery};
use crate::router::Screen;
use crate::AppState;

/// Upper bound for `?limit=` on the listing.
const MAX_LIST_LIMIT: usize = 100;

pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateEntryRequest>,
) -> AppResult<(StatusCode, Json<ResultsView>)> {
    let entry = state.entries.create(auth_user.id, &body.content).await?;

    // The entry is stored at this point; a failed re-read only drops the aggregates.
    let collection = match state.entries.list_by_owner(auth_user.id, None).await {
        Ok(all) => Some(all),
        Err(e) => {
            tracing::warn!(
                user_id = %auth_user.id,
                entry_id = %entry.id,
                error = %e,
                "Entry saved but aggregates could not be loaded"
            );
            None
        }
    };

    {
        let view = state.session.view();
        state.view_router.lock().await.navigate(&view, Screen::Results);
    }

    let results = ResultsView::build(Some(entry), collection.as_deref(), Utc::now());
    Ok((StatusCode::CREATED, Json(results)))
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EntryListQuery>,
) -> AppResult<Json<Vec<DiaryEntry>>> {
    let limit = query.limit.map(|l| l.min(MAX_LIST_LIMIT));
    let entries = state.entries.list_by_owner(auth_user.id, limit).await?;
    Ok(Json(entries))
}

pub async fn latest_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DiaryEntry>> {
    let entry = state
        .entries
        .most_recent(auth_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No diary entries yet".into()))?;
    Ok(Json(entry))
}
