//! Bounded retry with exponential backoff for provider requests.

use std::future::Future;
use std::time::Duration;

use color_eyre::eyre::Report;
use uuid::Uuid;

/// Result of one request attempt.
pub(crate) enum Attempt<T> {
    Done(T),
    /// Transient failure, worth another attempt.
    Retry(Report),
    /// Permanent failure.
    Fail(Report),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt` (starting at 1).
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(
        &self,
        provider: &'static str,
        message_id: Uuid,
        mut call: F,
    ) -> color_eyre::eyre::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        provider,
                        %message_id,
                        attempt,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(self.delay(attempt)).await;
                }
                Attempt::Retry(e) => {
                    return Err(e.wrap_err(format!("giving up after {} retries", self.retries)));
                }
            }
        }
    }
}
