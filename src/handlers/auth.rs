use std::future::Future;

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::auth::rate_limit::AuthAction;
use crate::backend::{SignUp, SignUpOutcome};
use crate::dto::{
    AuthResponse, LoginRequest, MessageResponse, RegisterRequest, ResendRequest,
    MIN_PASSWORD_CHARS,
};
use crate::error::{AppError, AppResult, AuthError, ValidationError};
use crate::models::identity::{Identity, ProfileResponse};
use crate::AppState;

/// Run one auth service call, bounded by the backend timeout.
async fn bounded<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    tokio::time::timeout(state.config.backend_timeout, call)
        .await
        .unwrap_or(Err(AuthError::Timeout))
}

async fn throttle(state: &AppState, action: AuthAction, email: &str) -> AppResult<()> {
    state
        .limiter
        .attempt(action, email)
        .await
        .map(|_| ())
        .map_err(|_| AppError::RateLimited)
}

/// Let the session mirror catch up with a change this request just made.
async fn await_mirror(state: &AppState, expected: Option<Uuid>) {
    let view = state
        .session
        .settle(state.config.backend_timeout, |v| {
            v.initialized && v.identity.as_ref().map(|i| i.id) == expected
        })
        .await;
    if view.identity.as_ref().map(|i| i.id) != expected {
        tracing::warn!(expected = ?expected, "Session mirror did not reflect the change in time");
    }
}

fn check_passwords(body: &RegisterRequest) -> Result<(), ValidationError> {
    if body.password != body.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_CHARS,
        });
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    check_passwords(&body)?;
    body.validate().map_err(ValidationError::from)?;
    throttle(&state, AuthAction::Register, &body.email).await?;

    let name = Some(body.name.trim().to_string()).filter(|n| !n.is_empty());
    let outcome = bounded(
        &state,
        state.auth.sign_up(SignUp {
            email: body.email.trim().to_string(),
            password: body.password.clone(),
            name,
        }),
    )
    .await?;

    let identity = match outcome {
        SignUpOutcome::SignedIn(identity) => identity,
        SignUpOutcome::ConfirmationRequired(pending) => {
            // One sign-in attempt; unconfirmed addresses are reported, not retried.
            match bounded(
                &state,
                state
                    .auth
                    .sign_in_with_password(&pending.email, &body.password),
            )
            .await
            {
                Ok(identity) => identity,
                Err(AuthError::EmailNotConfirmed) => {
                    tracing::info!(user_id = %pending.id, "Registered, awaiting email confirmation");
                    return Ok(Json(AuthResponse::confirmation_required(&pending)));
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    await_mirror(&state, Some(identity.id)).await;
    tracing::info!(user_id = %identity.id, "User registered and signed in");
    Ok(Json(AuthResponse::signed_in(&identity)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    body.validate().map_err(ValidationError::from)?;
    throttle(&state, AuthAction::Login, &body.email).await?;

    let identity: Identity = match bounded(
        &state,
        state
            .auth
            .sign_in_with_password(body.email.trim(), &body.password),
    )
    .await
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(reason = %e, "Sign-in rejected");
            return Err(e.into());
        }
    };

    await_mirror(&state, Some(identity.id)).await;
    tracing::info!(user_id = %identity.id, "User signed in");
    Ok(Json(AuthResponse::signed_in(&identity)))
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    Json(body): Json<ResendRequest>,
) -> AppResult<Json<MessageResponse>> {
    body.validate().map_err(ValidationError::from)?;
    throttle(&state, AuthAction::ResendConfirmation, &body.email).await?;

    bounded(&state, state.auth.resend_confirmation(body.email.trim())).await?;
    Ok(Json(MessageResponse {
        message: "Confirmation email sent".into(),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    bounded(&state, state.auth.sign_out()).await?;
    await_mirror(&state, None).await;

    tracing::info!(user_id = %auth_user.id, "User signed out");
    Ok(Json(json!({ "signed_out": true, "redirect": "/login" })))
}

pub async fn me(Extension(auth_user): Extension<AuthUser>) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(&auth_user.identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            name: String::new(),
            email: "a@example.com".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn test_password_rules() {
        assert_eq!(
            check_passwords(&request("secret1", "secret2")),
            Err(ValidationError::PasswordMismatch)
        );
        assert_eq!(
            check_passwords(&request("12345", "12345")),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        assert_eq!(check_passwords(&request("123456", "123456")), Ok(()));
    }
}
