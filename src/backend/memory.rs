//! In-process auth service and record store.
//!
//! Used for offline runs (`BACKEND=memory`) and by the test suite. Behaves like
//! the hosted platform from the caller's side: same events, same error kinds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{AuthEvent, AuthService, RecordStore, SignUp, SignUpOutcome, AUTH_EVENT_CAPACITY};
use crate::auth::tokens::{hash_token, mint_access_token};
use crate::error::{AuthError, StoreError};
use crate::models::entry::{DiaryEntry, EntryQuery, NewEntry};
use crate::models::identity::{Identity, Session};

const ACCESS_TTL_MINUTES: i64 = 60;
const REFRESH_MARGIN_SECS: i64 = 120;
const REFRESH_CHECK_INTERVAL_SECS: u64 = 30;

struct Account {
    identity: Identity,
    password_hash: String,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    refresh_hash: Option<String>,
}

pub struct MemoryAuth {
    state: RwLock<AuthState>,
    events: broadcast::Sender<AuthEvent>,
    require_confirmation: bool,
    signing_secret: String,
    fail_session_fetch: AtomicBool,
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Rejected(format!("failed to hash password: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryAuth {
    pub fn new(require_confirmation: bool) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            state: RwLock::new(AuthState::default()),
            events,
            require_confirmation,
            signing_secret: Uuid::new_v4().to_string(),
            fail_session_fetch: AtomicBool::new(false),
        }
    }

    /// Mark an address as confirmed, as following the emailed link would.
    #[cfg(test)]
    pub async fn confirm_email(&self, email: &str) -> Result<Identity, AuthError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&normalize_email(email))
            .ok_or(AuthError::UnknownAccount)?;
        account.identity.email_confirmed_at = Some(Utc::now());
        let identity = account.identity.clone();

        let signed_in = match state.session.as_mut() {
            Some(session) if session.user.id == identity.id => {
                session.user = identity.clone();
                true
            }
            _ => false,
        };
        drop(state);
        if signed_in {
            self.publish(AuthEvent::UserUpdated(identity.clone()));
        }
        Ok(identity)
    }

    /// Make every later `current_session` call fail with a network error.
    #[cfg(test)]
    pub fn fail_session_fetch(&self, fail: bool) {
        self.fail_session_fetch.store(fail, Ordering::SeqCst);
    }

    /// Pull the current session's expiry to `secs` from now.
    #[cfg(test)]
    pub async fn expire_session_in(&self, secs: i64) {
        if let Some(session) = self.state.write().await.session.as_mut() {
            session.expires_at = Utc::now() + Duration::seconds(secs);
        }
    }

    /// Rotate the current session's tokens, as the hosted refresh would.
    pub async fn refresh(&self) -> Result<Identity, AuthError> {
        let mut state = self.state.write().await;
        let current = state.session.clone().ok_or(AuthError::InvalidCredentials)?;
        if state.refresh_hash.as_deref() != Some(hash_token(&current.refresh_token).as_str()) {
            return Err(AuthError::InvalidCredentials);
        }
        let session = self.open_session(&mut state, current.user)?;
        let identity = session.user.clone();
        drop(state);
        self.publish(AuthEvent::TokenRefreshed(identity.clone()));
        Ok(identity)
    }

    /// Refresh only when the open session expires within the margin.
    pub async fn refresh_if_due(&self, now: DateTime<Utc>) -> Result<Option<Identity>, AuthError> {
        let due = self
            .state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.expires_at - now <= Duration::seconds(REFRESH_MARGIN_SECS))
            .unwrap_or(false);
        if !due {
            return Ok(None);
        }
        self.refresh().await.map(Some)
    }

    fn open_session(&self, state: &mut AuthState, user: Identity) -> Result<Session, AuthError> {
        let ttl = Duration::minutes(ACCESS_TTL_MINUTES);
        let access_token = mint_access_token(&user, ttl, &self.signing_secret)?;
        let refresh_token = Uuid::new_v4().to_string();
        state.refresh_hash = Some(hash_token(&refresh_token));
        let session = Session {
            access_token,
            refresh_token,
            expires_at: Utc::now() + ttl,
            user,
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    fn publish(&self, event: AuthEvent) {
        tracing::debug!(event = event.name(), "Auth state changed");
        // No receivers is fine: nobody is mirroring the session yet.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn current_session(&self) -> Result<Option<Identity>, AuthError> {
        if self.fail_session_fetch.load(Ordering::SeqCst) {
            return Err(AuthError::Network("session fetch disabled".into()));
        }
        let state = self.state.read().await;
        Ok(state.session.as_ref().map(|s| s.user.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, request: SignUp) -> Result<SignUpOutcome, AuthError> {
        let key = normalize_email(&request.email);
        let password_hash = hash_password(&request.password)?;

        let mut state = self.state.write().await;
        if state.accounts.contains_key(&key) {
            return Err(AuthError::AlreadyRegistered);
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            email: key.clone(),
            name: request.name.filter(|n| !n.trim().is_empty()),
            email_confirmed_at: if self.require_confirmation {
                None
            } else {
                Some(Utc::now())
            },
        };
        state.accounts.insert(
            key,
            Account {
                identity: identity.clone(),
                password_hash,
            },
        );

        if self.require_confirmation {
            tracing::info!(user_id = %identity.id, "Account created, confirmation pending");
            return Ok(SignUpOutcome::ConfirmationRequired(identity));
        }

        self.open_session(&mut state, identity.clone())?;
        drop(state);
        self.publish(AuthEvent::SignedIn(identity.clone()));
        Ok(SignUpOutcome::SignedIn(identity))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get(&normalize_email(email))
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !account.identity.is_confirmed() {
            return Err(AuthError::EmailNotConfirmed);
        }

        let identity = account.identity.clone();
        self.open_session(&mut state, identity.clone())?;
        drop(state);
        self.publish(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        state.session = None;
        state.refresh_hash = None;
        drop(state);
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    async fn resend_confirmation(&self, email: &str) -> Result<(), AuthError> {
        let state = self.state.read().await;
        match state.accounts.get(&normalize_email(email)) {
            Some(account) if !account.identity.is_confirmed() => {
                tracing::info!(user_id = %account.identity.id, "Confirmation email re-sent");
                Ok(())
            }
            _ => Err(AuthError::UnknownAccount),
        }
    }
}

/// Rotate the in-memory session's tokens before they lapse.
pub fn spawn_token_refresh_worker(auth: Arc<MemoryAuth>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(REFRESH_CHECK_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match auth.refresh_if_due(Utc::now()).await {
                Ok(Some(identity)) => {
                    tracing::debug!(user_id = %identity.id, "Session tokens rotated");
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Token refresh failed, will try again"),
            }
        }
    });
}

pub struct MemoryStore {
    rows: RwLock<Vec<DiaryEntry>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    inserts: std::sync::atomic::AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            inserts: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of insert calls received, including failed ones.
    #[cfg(test)]
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_entry(&self, entry: NewEntry) -> Result<DiaryEntry, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        let row = DiaryEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            content: entry.content,
            mood_score: entry.mood_score,
            primary_emotion: entry.primary_emotion,
            created_at: entry.created_at,
        };
        self.rows.write().await.push(row.clone());
        Ok(row)
    }

    async fn select_entries(&self, query: EntryQuery) -> Result<Vec<DiaryEntry>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        let rows = self.rows.read().await;
        let mut selected: Vec<DiaryEntry> = rows
            .iter()
            .filter(|e| e.user_id == query.owner)
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}
