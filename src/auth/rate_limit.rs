use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Auth actions that are throttled per email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthAction {
    Login,
    Register,
    ResendConfirmation,
}

impl AuthAction {
    /// (max attempts, window) for this action.
    fn policy(self) -> (u32, Duration) {
        match self {
            AuthAction::Login => (5, Duration::from_secs(60)),
            AuthAction::Register => (3, Duration::from_secs(600)),
            // The hosted service refuses resends more often than once a minute.
            AuthAction::ResendConfirmation => (1, Duration::from_secs(60)),
        }
    }
}

struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window attempt counter keyed by action and normalized email.
#[derive(Clone, Default)]
pub struct AttemptLimiter {
    windows: Arc<Mutex<HashMap<(AuthAction, String), Window>>>,
}

impl AttemptLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt. Returns the attempts left, or how long to wait.
    pub async fn attempt(&self, action: AuthAction, email: &str) -> Result<u32, Duration> {
        self.attempt_at(action, email, Instant::now()).await
    }

    async fn attempt_at(&self, action: AuthAction, email: &str, now: Instant) -> Result<u32, Duration> {
        let (max_attempts, window) = action.policy();
        let key = (action, email.trim().to_lowercase());
        let mut windows = self.windows.lock().await;

        let entry = windows.entry(key).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.duration_since(entry.started) >= window {
            entry.count = 0;
            entry.started = now;
        }

        if entry.count >= max_attempts {
            let retry_after = window.saturating_sub(now.duration_since(entry.started));
            tracing::warn!(
                action = ?action,
                retry_after_secs = retry_after.as_secs(),
                "Auth attempt throttled"
            );
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(max_attempts - entry.count)
    }

    /// Drop windows that have expired for their action.
    pub async fn prune(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|(action, _), w| now.duration_since(w.started) < action.policy().1);
    }
}

/// Prune the limiter periodically so abandoned addresses do not accumulate.
pub fn spawn_limiter_pruner(limiter: AttemptLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            limiter.prune().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_allows_five_then_blocks() {
        let limiter = AttemptLimiter::new();
        for i in 0..5 {
            let result = limiter.attempt(AuthAction::Login, "a@example.com").await;
            assert!(result.is_ok(), "attempt {} should be allowed", i + 1);
        }
        let result = limiter.attempt(AuthAction::Login, "a@example.com").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_email_is_normalized() {
        let limiter = AttemptLimiter::new();
        limiter
            .attempt(AuthAction::ResendConfirmation, "A@Example.com ")
            .await
            .unwrap();
        assert!(limiter
            .attempt(AuthAction::ResendConfirmation, "a@example.com")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_actions_and_addresses_are_independent() {
        let limiter = AttemptLimiter::new();
        limiter.attempt(AuthAction::ResendConfirmation, "a@example.com").await.unwrap();
        assert!(limiter.attempt(AuthAction::Login, "a@example.com").await.is_ok());
        assert!(limiter
            .attempt(AuthAction::ResendConfirmation, "b@example.com")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = AttemptLimiter::new();
        let start = Instant::now();
        limiter
            .attempt_at(AuthAction::ResendConfirmation, "a@example.com", start)
            .await
            .unwrap();
        let retry = limiter
            .attempt_at(AuthAction::ResendConfirmation, "a@example.com", start + Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(retry, Duration::from_secs(50));
        assert!(limiter
            .attempt_at(AuthAction::ResendConfirmation, "a@example.com", start + Duration::from_secs(61))
            .await
            .is_ok());
    }
}
