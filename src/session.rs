//! In-process mirror of "who is signed in".
//!
//! The mirror subscribes to the auth service's change notifications, fetches
//! the current session once, and then applies every notification in arrival
//! order. The watch sender lives inside the subscription task, so that task is
//! the only writer; routes and screens get read-only snapshots.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{AuthEvent, AuthService};
use crate::models::identity::Identity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub identity: Option<Identity>,
    pub initialized: bool,
}

impl SessionView {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

pub struct SessionMirror {
    rx: watch::Receiver<SessionView>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionMirror {
    /// Start mirroring `auth`. `fetch_timeout` bounds the initial session fetch.
    pub fn spawn(auth: Arc<dyn AuthService>, fetch_timeout: Duration) -> Arc<Self> {
        let (tx, rx) = watch::channel(SessionView::default());
        let cancel = CancellationToken::new();
        // Subscribe before fetching so no notification slips between the two.
        let events = auth.subscribe();
        let task = tokio::spawn(run_mirror(auth, events, tx, cancel.clone(), fetch_timeout));

        Arc::new(Self {
            rx,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn view(&self) -> SessionView {
        self.rx.borrow().clone()
    }

    /// A receiver that observes every change of the mirrored view.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.rx.clone()
    }

    /// Resolve once the initial fetch has completed (successfully or not).
    pub async fn wait_initialized(&self) -> SessionView {
        let mut rx = self.rx.clone();
        let view = match rx.wait_for(|v| v.initialized).await {
            Ok(view) => view.clone(),
            // Task gone: report whatever was last mirrored.
            Err(_) => self.view(),
        };
        view
    }

    /// Wait until the mirrored view satisfies `settled`, or `limit` elapses.
    /// Returns the view at that point either way.
    pub async fn settle(
        &self,
        limit: Duration,
        settled: impl Fn(&SessionView) -> bool,
    ) -> SessionView {
        let mut rx = self.rx.clone();
        let view = match tokio::time::timeout(limit, rx.wait_for(|v| settled(v))).await {
            Ok(Ok(view)) => view.clone(),
            _ => self.view(),
        };
        view
    }

    /// Stop listening for notifications and wait for the listener to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Session mirror task ended abnormally");
            }
        }
    }
}

impl Drop for SessionMirror {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn fetch_identity(auth: &dyn AuthService, fetch_timeout: Duration) -> Option<Identity> {
    match tokio::time::timeout(fetch_timeout, auth.current_session()).await {
        Ok(Ok(identity)) => identity,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Session fetch failed, continuing signed out");
            None
        }
        Err(_) => {
            tracing::warn!(timeout_ms = fetch_timeout.as_millis() as u64, "Session fetch timed out, continuing signed out");
            None
        }
    }
}

fn apply(tx: &watch::Sender<SessionView>, identity: Option<Identity>) {
    tx.send_modify(|view| {
        view.identity = identity;
        view.initialized = true;
    });
}

async fn run_mirror(
    auth: Arc<dyn AuthService>,
    mut events: broadcast::Receiver<AuthEvent>,
    tx: watch::Sender<SessionView>,
    cancel: CancellationToken,
    fetch_timeout: Duration,
) {
    let initial = tokio::select! {
        _ = cancel.cancelled() => return,
        identity = fetch_identity(auth.as_ref(), fetch_timeout) => identity,
    };
    tracing::info!(
        user_id = ?initial.as_ref().map(|i| i.id),
        "Session mirror initialized"
    );
    apply(&tx, initial);

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(event) => {
                tracing::debug!(event = event.name(), "Mirroring session change");
                apply(&tx, event.identity().cloned());
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Session notifications dropped, re-fetching session");
                let identity = fetch_identity(auth.as_ref(), fetch_timeout).await;
                apply(&tx, identity);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Session mirror unsubscribed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryAuth;
    use crate::backend::{SignUp, AUTH_EVENT_CAPACITY};

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn signed_up_auth() -> Arc<MemoryAuth> {
        let auth = Arc::new(MemoryAuth::new(false));
        auth.sign_up(SignUp {
            email: "a@example.com".into(),
            password: "secret1".into(),
            name: None,
        })
        .await
        .unwrap();
        auth
    }

    async fn next_change(rx: &mut watch::Receiver<SessionView>) -> SessionView {
        tokio::time::timeout(TIMEOUT, rx.changed())
            .await
            .expect("mirror did not change in time")
            .unwrap();
        let view = rx.borrow_and_update().clone();
        view
    }

    #[tokio::test]
    async fn test_initial_fetch_mirrors_existing_session() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth, TIMEOUT);
        let view = mirror.wait_initialized().await;
        assert!(view.initialized);
        assert_eq!(view.identity.unwrap().email, "a@example.com");
    }

    #[tokio::test]
    async fn test_fetch_failure_still_initializes() {
        let auth = Arc::new(MemoryAuth::new(false));
        auth.fail_session_fetch(true);
        let mirror = SessionMirror::spawn(auth, TIMEOUT);
        let view = mirror.wait_initialized().await;
        assert_eq!(view, SessionView { identity: None, initialized: true });
    }

    #[tokio::test]
    async fn test_notifications_replace_identity() {
        let auth = Arc::new(MemoryAuth::new(false));
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        let mut rx = mirror.watch();
        mirror.wait_initialized().await;
        rx.borrow_and_update();

        auth.sign_up(SignUp {
            email: "a@example.com".into(),
            password: "secret1".into(),
            name: Some("민지".into()),
        })
        .await
        .unwrap();
        let view = next_change(&mut rx).await;
        assert_eq!(view.identity.as_ref().unwrap().display_name(), "민지");

        auth.sign_out().await.unwrap();
        let view = next_change(&mut rx).await;
        assert_eq!(view, SessionView { identity: None, initialized: true });
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_identity() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        let mut rx = mirror.watch();
        let before = mirror.wait_initialized().await.identity;
        rx.borrow_and_update();

        auth.refresh().await.unwrap();
        let view = next_change(&mut rx).await;
        assert_eq!(view.identity, before);
    }

    #[tokio::test]
    async fn test_buffered_changes_apply_after_fetch_in_order() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        // The mirror task has not run yet: both changes queue behind the fetch.
        auth.sign_out().await.unwrap();
        let identity = auth
            .sign_in_with_password("a@example.com", "secret1")
            .await
            .unwrap();

        let view = mirror
            .settle(TIMEOUT, |v| v.initialized && v.identity.is_some())
            .await;
        assert_eq!(view.identity, Some(identity));
        tokio::task::yield_now().await;
        assert!(mirror.view().is_authenticated());
    }

    #[tokio::test]
    async fn test_lagged_notifications_resync_from_service() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        mirror.wait_initialized().await;

        // Overflow the channel before the mirror gets a chance to drain it.
        for _ in 0..AUTH_EVENT_CAPACITY + 8 {
            auth.sign_out().await.unwrap();
        }
        let identity = auth
            .sign_in_with_password("a@example.com", "secret1")
            .await
            .unwrap();

        let expected = auth.current_session().await.unwrap();
        assert_eq!(expected.as_ref(), Some(&identity));
        let view = mirror
            .settle(TIMEOUT, |v| v.identity.as_ref() == Some(&identity))
            .await;
        assert_eq!(view.identity, expected);
    }

    #[tokio::test]
    async fn test_user_update_replaces_mirrored_identity() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        let mut rx = mirror.watch();
        let before = mirror.wait_initialized().await.identity.unwrap();
        rx.borrow_and_update();

        let updated = auth.confirm_email("a@example.com").await.unwrap();
        let view = next_change(&mut rx).await;
        let mirrored = view.identity.unwrap();
        assert_eq!(mirrored.id, before.id);
        assert_eq!(mirrored.email_confirmed_at, updated.email_confirmed_at);
    }

    #[tokio::test]
    async fn test_settle_waits_for_sign_out() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        mirror.wait_initialized().await;

        auth.sign_out().await.unwrap();
        let view = mirror.settle(TIMEOUT, |v| v.identity.is_none()).await;
        assert!(!view.is_authenticated());

        // An unmet condition gives up after the limit.
        let view = mirror
            .settle(Duration::from_millis(20), |v| v.identity.is_some())
            .await;
        assert!(!view.is_authenticated());
    }

    #[tokio::test]
    async fn test_shutdown_stops_mirroring() {
        let auth = signed_up_auth().await;
        let mirror = SessionMirror::spawn(auth.clone(), TIMEOUT);
        mirror.wait_initialized().await;
        mirror.shutdown().await;

        auth.sign_out().await.unwrap();
        tokio::task::yield_now().await;
        assert!(mirror.view().is_authenticated());
        // A second shutdown is a no-op.
        mirror.shutdown().await;
    }
}
