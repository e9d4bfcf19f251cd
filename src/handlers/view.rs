use axum::{extract::State, Json};

use crate::dto::NavigateRequest;
use crate::router::Resolution;
use crate::AppState;

pub async fn current_view(State(state): State<AppState>) -> Json<Resolution> {
    let session = state.session.view();
    let resolution = state.view_router.lock().await.render(&session);
    Json(resolution)
}

pub async fn navigate(
    State(state): State<AppState>,
    Json(body): Json<NavigateRequest>,
) -> Json<Resolution> {
    let session = state.session.view();
    let mut router = state.view_router.lock().await;
    let resolution = router.navigate_path(&session, &body.path);
    tracing::debug!(
        requested = %body.path,
        intent = ?router.intent(),
        redirected = resolution.redirected,
        "Navigated"
    );
    Json(resolution)
}
