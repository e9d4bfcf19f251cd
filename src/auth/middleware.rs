use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::identity::Identity;
use crate::AppState;

/// The mirrored identity, attached to requests that passed the session gate.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub identity: Identity,
}

impl From<Identity> for AuthUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            identity,
        }
    }
}

/// Admit the request only when the session mirror holds an identity.
///
/// While the mirror is still restoring the session the request waits for it,
/// up to the backend timeout.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let view = match tokio::time::timeout(
        state.config.backend_timeout,
        state.session.wait_initialized(),
    )
    .await
    {
        Ok(view) => view,
        Err(_) => return Err(AppError::Initializing),
    };

    let identity = view.identity.ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(AuthUser::from(identity));
    Ok(next.run(req).await)
}
