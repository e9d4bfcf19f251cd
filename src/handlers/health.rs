use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::config::BackendKind;
use crate::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "moodlog-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once the session mirror has finished its initial fetch.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let backend = match state.config.backend {
        BackendKind::Hosted => "hosted",
        BackendKind::Memory => "memory",
    };

    if state.session.view().initialized {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "session": "initialized", "backend": backend },
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "session": "initializing", "backend": backend },
            })),
        )
    }
}
