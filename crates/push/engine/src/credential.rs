//! Background-refreshed access credentials for token-authenticated providers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Headroom before expiry at which a token is refreshed.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(600);

/// Delay between failed exchange attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Token returned by a credential exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub access_token: String,
    /// Lifetime from the moment of the exchange.
    pub expires_in: Duration,
}

/// Exchanges long-lived credentials for a short-lived access token.
#[trait_variant::make(Send)]
pub trait TokenSource: Send + Sync {
    async fn exchange(&self) -> color_eyre::eyre::Result<Grant>;
}

/// A live access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Instant,
}

/// Refresh state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// No exchange has succeeded yet.
    Refreshing,
    /// Last known good token.
    Valid(Credential),
}

/// Refresh timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub margin: Duration,
    pub backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: REFRESH_MARGIN,
            backoff: RETRY_BACKOFF,
        }
    }
}

impl RefreshPolicy {
    /// Delay before refreshing a token with the given lifetime.
    ///
    /// Short-lived tokens are used for their full lifetime.
    pub fn refresh_delay(&self, lifetime: Duration) -> Duration {
        if lifetime > self.margin {
            lifetime - self.margin
        } else {
            lifetime
        }
    }
}

/// Holds the current access token and keeps it fresh in the background.
///
/// Readers clone the credential under a read lock; the refresh task is the
/// only writer. Dropping the manager stops the refresh task.
pub struct CredentialManager {
    state: Arc<RwLock<CredentialState>>,
    ready: Arc<Notify>,
    refresher: JoinHandle<()>,
}

impl CredentialManager {
    /// Start refreshing from `source`. Must be called inside a tokio runtime.
    pub fn spawn<S>(source: S, policy: RefreshPolicy) -> Self
    where
        S: TokenSource + 'static,
    {
        let state = Arc::new(RwLock::new(CredentialState::Refreshing));
        let ready = Arc::new(Notify::new());
        let refresher = tokio::spawn(refresh_loop(
            source,
            policy,
            Arc::clone(&state),
            Arc::clone(&ready),
        ));

        Self {
            state,
            ready,
            refresher,
        }
    }

    pub async fn state(&self) -> CredentialState {
        self.state.read().await.clone()
    }

    /// Current credential, if any exchange has succeeded.
    pub async fn current(&self) -> Option<Credential> {
        match &*self.state.read().await {
            CredentialState::Valid(credential) => Some(credential.clone()),
            CredentialState::Refreshing => None,
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.current().await.map(|c| c.token)
    }

    /// Current token, waiting for the first successful exchange if needed.
    pub async fn wait_for_token(&self) -> String {
        loop {
            let notified = self.ready.notified();
            if let Some(token) = self.token().await {
                return token;
            }
            notified.await;
        }
    }
}

impl Drop for CredentialManager {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}

async fn refresh_loop<S: TokenSource>(
    source: S,
    policy: RefreshPolicy,
    state: Arc<RwLock<CredentialState>>,
    ready: Arc<Notify>,
) {
    loop {
        let grant = match source.exchange().await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(error = %e, "access token exchange failed, retrying");
                tokio::time::sleep(policy.backoff).await;
                continue;
            }
        };

        if grant.access_token.is_empty() || grant.expires_in.is_zero() {
            tracing::warn!(
                expires_in_secs = grant.expires_in.as_secs(),
                "invalid access token response, retrying"
            );
            tokio::time::sleep(policy.backoff).await;
            continue;
        }

        let credential = Credential {
            token: grant.access_token,
            expires_at: Instant::now() + grant.expires_in,
        };
        *state.write().await = CredentialState::Valid(credential);
        ready.notify_waiters();

        tracing::info!(
            expires_in_secs = grant.expires_in.as_secs(),
            "access token refreshed"
        );
        tokio::time::sleep(policy.refresh_delay(grant.expires_in)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use color_eyre::eyre::eyre;
    use tokio::sync::mpsc;

    use super::*;

    /// Replays a fixed script of exchange results and reports each call time.
    struct ScriptedSource {
        script: Mutex<VecDeque<color_eyre::eyre::Result<Grant>>>,
        calls: mpsc::UnboundedSender<Instant>,
    }

    impl ScriptedSource {
        fn new(
            script: Vec<color_eyre::eyre::Result<Grant>>,
        ) -> (Self, mpsc::UnboundedReceiver<Instant>) {
            let (calls, rx) = mpsc::unbounded_channel();
            let source = Self {
                script: Mutex::new(script.into()),
                calls,
            };
            (source, rx)
        }
    }

    impl TokenSource for ScriptedSource {
        async fn exchange(&self) -> color_eyre::eyre::Result<Grant> {
            let _ = self.calls.send(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(eyre!("script exhausted")))
        }
    }

    fn grant(token: &str, secs: u64) -> color_eyre::eyre::Result<Grant> {
        Ok(Grant {
            access_token: token.to_string(),
            expires_in: Duration::from_secs(secs),
        })
    }

    #[test]
    fn test_refresh_delay() {
        let policy = RefreshPolicy::default();
        assert_eq!(
            policy.refresh_delay(Duration::from_secs(3600)),
            Duration::from_secs(3000)
        );
        assert_eq!(
            policy.refresh_delay(Duration::from_secs(300)),
            Duration::from_secs(300)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_token_becomes_valid() {
        let (source, _calls) = ScriptedSource::new(vec![grant("t1", 3600)]);
        let manager = CredentialManager::spawn(source, RefreshPolicy::default());

        assert_eq!(manager.wait_for_token().await, "t1");
        let credential = manager.current().await.unwrap();
        assert!(credential.expires_at > Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_retry_after_backoff() {
        let (source, mut calls) = ScriptedSource::new(vec![
            Err(eyre!("network down")),
            grant("", 3600),
            grant("t1", 3600),
        ]);
        let manager = CredentialManager::spawn(source, RefreshPolicy::default());

        let first = calls.recv().await.unwrap();
        assert_eq!(manager.state().await, CredentialState::Refreshing);

        assert_eq!(manager.wait_for_token().await, "t1");
        let _second = calls.recv().await.unwrap();
        let third = calls.recv().await.unwrap();
        assert_eq!(third - first, RETRY_BACKOFF * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_before_expiry() {
        let (source, mut calls) =
            ScriptedSource::new(vec![grant("t1", 3600), grant("t2", 3600)]);
        let manager = CredentialManager::spawn(source, RefreshPolicy::default());

        let first = calls.recv().await.unwrap();
        assert_eq!(manager.wait_for_token().await, "t1");

        let second = calls.recv().await.unwrap();
        assert_eq!(second - first, Duration::from_secs(3000));
        tokio::task::yield_now().await;
        assert_eq!(manager.token().await.as_deref(), Some("t2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_last_good_token() {
        let (source, mut calls) = ScriptedSource::new(vec![
            grant("t1", 3600),
            Err(eyre!("provider outage")),
        ]);
        let manager = CredentialManager::spawn(source, RefreshPolicy::default());

        calls.recv().await.unwrap();
        assert_eq!(manager.wait_for_token().await, "t1");

        // refresh attempt fails, then the exhausted script keeps failing
        calls.recv().await.unwrap();
        calls.recv().await.unwrap();
        assert_eq!(manager.token().await.as_deref(), Some("t1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_never_torn() {
        let old = "a".repeat(4096);
        let new = "b".repeat(4096);
        let script = (0..200)
            .map(|i| {
                let token = if i % 2 == 0 { &old } else { &new };
                Ok(Grant {
                    access_token: token.clone(),
                    expires_in: Duration::from_millis(1),
                })
            })
            .collect();
        let (source, _calls) = ScriptedSource::new(script);
        let manager = Arc::new(CredentialManager::spawn(source, RefreshPolicy::default()));
        manager.wait_for_token().await;

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let (old, new) = (old.clone(), new.clone());
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let token = manager.token().await.unwrap();
                        assert!(token == old || token == new, "torn token observed");
                    }
                })
            })
            .collect();

        for reader in readers {
            reader.await.unwrap();
        }
    }
}
