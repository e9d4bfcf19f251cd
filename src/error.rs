use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Rejections from the hosted auth service, already classified.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been confirmed")]
    EmailNotConfirmed,

    #[error("An account with this email already exists")]
    AlreadyRegistered,

    #[error("No account is waiting for confirmation at this address")]
    UnknownAccount,

    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("Auth service did not respond in time")]
    Timeout,

    #[error("Auth service unreachable: {0}")]
    Network(String),

    #[error("Auth service rejected the request: {0}")]
    Rejected(String),
}

/// Failure reported by a record store backend.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record store unreachable: {0}")]
    Unavailable(String),

    #[error("Record store rejected the operation: {0}")]
    Rejected(String),

    #[error("Record store returned an unreadable response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("Could not load entries: {0}")]
    Store(#[from] StoreError),

    #[error("Loading entries timed out")]
    Timeout,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("Could not save the entry: {0}")]
    Store(#[from] StoreError),

    #[error("Saving the entry timed out")]
    Timeout,
}

/// Input rejected before any external call is made.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please write something in your diary")]
    EmptyContent,

    #[error("Diary entries must be at least {min} characters")]
    ContentTooShort { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Invalid field {field}: {message}")]
    Field { field: String, message: String },
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid value".into());
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("request".into(), "invalid value".into()));
        ValidationError::Field { field, message }
    }
}

/// Outcome of the entry create path: either rejected locally or failed remotely.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EntryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Session is still being restored")]
    Initializing,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<EntryError> for AppError {
    fn from(err: EntryError) -> Self {
        match err {
            EntryError::Validation(e) => AppError::Validation(e),
            EntryError::Write(e) => AppError::Write(e),
        }
    }
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::Initializing => "initializing",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimited => "rate_limited",
            AppError::Validation(_) => "validation",
            AppError::Auth(_) => "auth",
            AppError::Read(_) => "read",
            AppError::Write(_) => "write",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Initializing => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::EmailNotConfirmed) => StatusCode::FORBIDDEN,
            AppError::Auth(AuthError::AlreadyRegistered) => StatusCode::CONFLICT,
            AppError::Auth(AuthError::UnknownAccount) => StatusCode::NOT_FOUND,
            AppError::Auth(AuthError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Auth(AuthError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Auth(_) => StatusCode::BAD_GATEWAY,
            AppError::Read(ReadError::Timeout) | AppError::Write(WriteError::Timeout) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            AppError::Read(_) | AppError::Write(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the same request may succeed when the user submits it again.
    fn retryable(&self) -> bool {
        matches!(
            self,
            AppError::Auth(_) | AppError::Read(_) | AppError::Write(_) | AppError::Initializing
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "Internal server error".to_string()
            }
            AppError::Read(e) => {
                tracing::warn!(error = %e, "Entry read failed");
                self.to_string()
            }
            AppError::Write(e) => {
                tracing::warn!(error = %e, "Entry write failed");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let mut error = json!({
            "message": message,
            "code": status.as_u16(),
            "kind": self.kind(),
            "retryable": self.retryable(),
        });
        match &self {
            AppError::Unauthorized => error["redirect"] = json!("/login"),
            AppError::Auth(AuthError::EmailNotConfirmed) => error["resend_available"] = json!(true),
            _ => {}
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
