//! Contracts for the hosted collaborators this service delegates to.
//!
//! Identity and persistence live in an external platform. Everything else in
//! the crate talks to it through [`AuthService`] and [`RecordStore`], so the
//! hosted REST client and the in-memory backend are interchangeable.

pub mod hosted;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::{BackendKind, Config};
use crate::error::{AuthError, StoreError};
use crate::models::entry::{DiaryEntry, EntryQuery, NewEntry};
use crate::models::identity::Identity;

/// Capacity of the auth notification channel.
pub const AUTH_EVENT_CAPACITY: usize = 32;

/// Session change notification published by an auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
    TokenRefreshed(Identity),
    UserUpdated(Identity),
}

impl AuthEvent {
    /// The identity a mirror should hold after this event.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthEvent::SignedIn(i) | AuthEvent::TokenRefreshed(i) | AuthEvent::UserUpdated(i) => {
                Some(i)
            }
            AuthEvent::SignedOut => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::SignedOut => "signed_out",
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
            AuthEvent::UserUpdated(_) => "user_updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account exists and a session was opened for it.
    SignedIn(Identity),
    /// The account exists but the address must be confirmed first.
    ConfirmationRequired(Identity),
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// The identity of the stored session, if any.
    async fn current_session(&self) -> Result<Option<Identity>, AuthError>;

    /// Receive every session change from now on.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_up(&self, request: SignUp) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn resend_confirmation(&self, email: &str) -> Result<(), AuthError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_entry(&self, entry: NewEntry) -> Result<DiaryEntry, StoreError>;

    /// Entries of `query.owner`, newest first, at most `query.limit`.
    async fn select_entries(&self, query: EntryQuery) -> Result<Vec<DiaryEntry>, StoreError>;
}

/// Auth service and record store wired to the same backend.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn RecordStore>,
}

impl Backend {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match config.backend {
            BackendKind::Hosted => {
                let hosted = config
                    .hosted
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("hosted backend selected without settings"))?;
                let client = hosted::HostedClient::new(hosted, config.backend_timeout)?;
                let auth = Arc::new(hosted::HostedAuth::new(client.clone()));
                hosted::spawn_token_refresh_worker(auth.clone());
                Ok(Self {
                    auth,
                    store: Arc::new(hosted::HostedStore::new(client)),
                })
            }
            BackendKind::Memory => {
                let auth = Arc::new(memory::MemoryAuth::new(config.memory_require_confirmation));
                memory::spawn_token_refresh_worker(auth.clone());
                Ok(Self {
                    auth,
                    store: Arc::new(memory::MemoryStore::new()),
                })
            }
        }
    }
}
