//! REST client for the hosted auth service and record store.
//!
//! Auth follows the GoTrue endpoints under `/auth/v1`, records follow the
//! PostgREST conventions under `/rest/v1`. Both share one HTTP client and the
//! current session, so record requests run with the signed-in user's token.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{AuthEvent, AuthService, RecordStore, SignUp, SignUpOutcome, AUTH_EVENT_CAPACITY};
use crate::auth::tokens::inspect_access_token;
use crate::config::HostedConfig;
use crate::error::{AuthError, StoreError};
use crate::models::entry::{DiaryEntry, EntryQuery, NewEntry};
use crate::models::identity::{Identity, Session};

/// Refresh the access token when it has less than this long to live.
const REFRESH_MARGIN_SECS: i64 = 120;
const REFRESH_CHECK_INTERVAL_SECS: u64 = 30;

#[derive(Clone)]
pub struct HostedClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    jwt_secret: Option<String>,
    entries_table: String,
    session_file: PathBuf,
    session: Arc<RwLock<Option<Session>>>,
}

impl HostedClient {
    pub fn new(config: &HostedConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
            entries_table: config.entries_table.clone(),
            session_file: config.session_file.clone(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.entries_table)
    }

    /// Attach the API key and the bearer token: the user's when signed in,
    /// the anonymous key otherwise.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct WireUserMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: Option<WireUserMetadata>,
}

impl From<WireUser> for Identity {
    fn from(u: WireUser) -> Self {
        Self {
            id: u.id,
            email: u.email.unwrap_or_default(),
            name: u.user_metadata.and_then(|m| m.name),
            email_confirmed_at: u.email_confirmed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Error body of either service. Older auth releases use `error` /
/// `error_description`, newer ones `error_code` / `msg`; the record store
/// uses `message`.
#[derive(Debug, Deserialize, Default)]
struct WireError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl WireError {
    fn text(&self) -> String {
        self.msg
            .as_ref()
            .or(self.error_description.as_ref())
            .or(self.message.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_else(|| "unknown error".into())
    }
}

fn classify_auth_error(status: StatusCode, body: &WireError) -> AuthError {
    let code = body.error_code.as_deref().unwrap_or_default();
    let text = body.text();
    if status == StatusCode::TOO_MANY_REQUESTS || code == "over_email_send_rate_limit" {
        return AuthError::RateLimited;
    }
    if code == "email_not_confirmed" || text.contains("Email not confirmed") {
        return AuthError::EmailNotConfirmed;
    }
    if code == "invalid_credentials"
        || text.contains("Invalid login credentials")
        || body.error.as_deref() == Some("invalid_grant")
    {
        return AuthError::InvalidCredentials;
    }
    if code == "user_already_exists" || text.contains("already registered") {
        return AuthError::AlreadyRegistered;
    }
    AuthError::Rejected(text)
}

fn transport_auth_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Network(err.to_string())
    }
}

fn transport_store_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Unavailable("request timed out".into())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

/// Pull the user out of a sign-up reply: a full session when the address is
/// auto-confirmed, or the bare user when confirmation is pending.
fn parse_sign_up(body: Value) -> Result<Result<Session, Identity>, serde_json::Error> {
    if body.get("access_token").is_some() {
        return serde_json::from_value::<TokenResponse>(body).map(|t| Ok(t.into_session()));
    }
    let user = match body.get("user") {
        Some(user) if user.is_object() => user.clone(),
        _ => body,
    };
    serde_json::from_value::<WireUser>(user).map(|u| Err(u.into()))
}

async fn auth_failure(response: Response) -> AuthError {
    let status = response.status();
    let body = response.json::<WireError>().await.unwrap_or_default();
    classify_auth_error(status, &body)
}

async fn store_failure(response: Response) -> StoreError {
    let status = response.status();
    let body = response.json::<WireError>().await.unwrap_or_default();
    if status.is_server_error() {
        StoreError::Unavailable(format!("{}: {}", status, body.text()))
    } else {
        StoreError::Rejected(format!("{}: {}", status, body.text()))
    }
}

// ---------------------------------------------------------------------------
// Session file
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct StoredSession {
    session: Session,
}

async fn load_session_file(path: &Path) -> Option<Session> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Could not read session file");
            return None;
        }
    };
    match serde_json::from_slice::<StoredSession>(&bytes) {
        Ok(stored) => Some(stored.session),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Ignoring unreadable session file");
            None
        }
    }
}

async fn save_session_file(path: &Path, session: &Session) {
    let stored = StoredSession {
        session: session.clone(),
    };
    let result = match serde_json::to_vec(&stored) {
        Ok(bytes) => tokio::fs::write(path, bytes).await,
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, path = %path.display(), "Could not persist session");
    }
}

async fn remove_session_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(error = %e, path = %path.display(), "Could not remove session file"),
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

pub struct HostedAuth {
    client: HostedClient,
    events: broadcast::Sender<AuthEvent>,
}

impl HostedAuth {
    pub fn new(client: HostedClient) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self { client, events }
    }

    fn publish(&self, event: AuthEvent) {
        tracing::info!(event = event.name(), "Auth state changed");
        let _ = self.events.send(event);
    }

    async fn install_session(&self, session: Session) -> Identity {
        save_session_file(&self.client.session_file, &session).await;
        let identity = session.user.clone();
        *self.client.session.write().await = Some(session);
        identity
    }

    async fn clear_session(&self) {
        *self.client.session.write().await = None;
        remove_session_file(&self.client.session_file).await;
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .http
            .post(self.client.auth_url("token?grant_type=password"))
            .header("apikey", &self.client.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport_auth_error)?;
        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Rejected(format!("unreadable token response: {e}")))?;
        Ok(tokens.into_session())
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .http
            .post(self.client.auth_url("token?grant_type=refresh_token"))
            .header("apikey", &self.client.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport_auth_error)?;
        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Rejected(format!("unreadable token response: {e}")))?;
        Ok(tokens.into_session())
    }

    /// Exchange the refresh token for a new session and announce it.
    /// A rejected refresh token ends the session.
    pub async fn refresh_session(&self) -> Result<Option<Identity>, AuthError> {
        let current = self.client.session.read().await.clone();
        let Some(current) = current else {
            return Ok(None);
        };
        match self.refresh_grant(&current.refresh_token).await {
            Ok(session) => {
                let identity = self.install_session(session).await;
                self.publish(AuthEvent::TokenRefreshed(identity.clone()));
                Ok(Some(identity))
            }
            Err(e @ (AuthError::Network(_) | AuthError::Timeout | AuthError::RateLimited)) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %current.user.id, "Refresh token rejected, ending session");
                self.clear_session().await;
                self.publish(AuthEvent::SignedOut);
                Ok(None)
            }
        }
    }

    /// Load the persisted session, discarding it when its token was not
    /// issued for this project.
    async fn restore_session(&self) -> Option<Session> {
        let session = load_session_file(&self.client.session_file).await?;
        match inspect_access_token(&session.access_token, self.client.jwt_secret.as_deref()) {
            Ok(claims) if claims.sub == session.user.id => {
                let mut session = session;
                session.expires_at = claims.expires_at();
                Some(session)
            }
            _ => {
                tracing::warn!("Stored session failed token inspection, discarding");
                remove_session_file(&self.client.session_file).await;
                None
            }
        }
    }

    fn needs_refresh(session: &Session, now: DateTime<Utc>) -> bool {
        session.expires_at - now <= chrono::Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

#[async_trait]
impl AuthService for HostedAuth {
    async fn current_session(&self) -> Result<Option<Identity>, AuthError> {
        let cached = self.client.session.read().await.clone();
        let session = match cached {
            Some(session) => session,
            None => match self.restore_session().await {
                Some(session) => {
                    *self.client.session.write().await = Some(session.clone());
                    session
                }
                None => return Ok(None),
            },
        };

        if session.is_expired(Utc::now()) {
            return self.refresh_session().await;
        }
        Ok(Some(session.user))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, request: SignUp) -> Result<SignUpOutcome, AuthError> {
        let mut body = json!({ "email": request.email, "password": request.password });
        if let Some(name) = &request.name {
            body["data"] = json!({ "name": name });
        }
        let response = self
            .client
            .http
            .post(self.client.auth_url("signup"))
            .header("apikey", &self.client.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_auth_error)?;
        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Rejected(format!("unreadable sign-up response: {e}")))?;

        match parse_sign_up(body) {
            Ok(Ok(session)) => {
                let identity = self.install_session(session).await;
                self.publish(AuthEvent::SignedIn(identity.clone()));
                Ok(SignUpOutcome::SignedIn(identity))
            }
            Ok(Err(identity)) => {
                tracing::info!(user_id = %identity.id, "Account created, confirmation pending");
                Ok(SignUpOutcome::ConfirmationRequired(identity))
            }
            Err(e) => Err(AuthError::Rejected(format!("unreadable sign-up response: {e}"))),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let session = self.password_grant(email, password).await?;
        let identity = self.install_session(session).await;
        self.publish(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let had_session = self.client.session.read().await.is_some();
        if had_session {
            let request = self.client.http.post(self.client.auth_url("logout"));
            let result = self.client.authorize(request).await.send().await;
            // The local session ends even when the remote revocation fails.
            match result {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(status = %response.status(), "Remote sign-out rejected");
                }
                Err(e) => tracing::warn!(error = %e, "Remote sign-out failed"),
                Ok(_) => {}
            }
        }
        self.clear_session().await;
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    async fn resend_confirmation(&self, email: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .http
            .post(self.client.auth_url("resend"))
            .header("apikey", &self.client.anon_key)
            .json(&json!({ "type": "signup", "email": email }))
            .send()
            .await
            .map_err(transport_auth_error)?;
        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }
        Ok(())
    }
}

/// Keep the access token fresh while a session is open.
pub fn spawn_token_refresh_worker(auth: Arc<HostedAuth>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(REFRESH_CHECK_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let due = auth
                .client
                .session
                .read()
                .await
                .as_ref()
                .map(|s| HostedAuth::needs_refresh(s, Utc::now()))
                .unwrap_or(false);
            if !due {
                continue;
            }
            if let Err(e) = auth.refresh_session().await {
                tracing::warn!(error = %e, "Token refresh failed, will try again");
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub struct HostedStore {
    client: HostedClient,
}

impl HostedStore {
    pub fn new(client: HostedClient) -> Self {
        Self { client }
    }
}

fn select_params(query: &EntryQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("user_id", format!("eq.{}", query.owner)),
        ("order", "created_at.desc".to_string()),
    ];
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

#[async_trait]
impl RecordStore for HostedStore {
    async fn insert_entry(&self, entry: NewEntry) -> Result<DiaryEntry, StoreError> {
        let request = self
            .client
            .http
            .post(self.client.rest_url())
            .header("Prefer", "return=representation")
            .json(&[&entry]);
        let response = self
            .client
            .authorize(request)
            .await
            .send()
            .await
            .map_err(transport_store_error)?;
        if !response.status().is_success() {
            return Err(store_failure(response).await);
        }
        let rows: Vec<DiaryEntry> = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed("insert returned no row".into()))
    }

    async fn select_entries(&self, query: EntryQuery) -> Result<Vec<DiaryEntry>, StoreError> {
        let request = self
            .client
            .http
            .get(self.client.rest_url())
            .query(&select_params(&query));
        let response = self
            .client
            .authorize(request)
            .await
            .send()
            .await
            .map_err(transport_store_error)?;
        if !response.status().is_success() {
            return Err(store_failure(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}
