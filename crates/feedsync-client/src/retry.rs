//! Back-off for marketplace calls.
//!
//! Only transport failures are retried. Any HTTP response, whatever its
//! status, is handed back to the caller for interpretation.

use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;

const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    /// Extra attempts after the first one.
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Un-jittered delay before retry number `retry` (1-based): the base
    /// doubled per earlier retry, capped at one minute.
    fn nominal_delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    fn jittered_delay(&self, retry: u32) -> Duration {
        // Uniform in [0.75, 1.25).
        self.nominal_delay(retry)
            .mul_f64(0.75 + rand::random::<f64>() * 0.5)
    }

    /// Runs `operation` until it succeeds, fails with a non-transport error,
    /// or the retry allowance is spent.
    pub(crate) async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut retry = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if retry >= self.max_retries || !is_transport_failure(&err) {
                return Err(err);
            }
            retry += 1;
            let delay = self.jittered_delay(retry);
            tracing::warn!(
                retry,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "marketplace unreachable, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Timeouts and refused connections. Everything else is final.
pub(crate) fn is_transport_failure(err: &ClientError) -> bool {
    matches!(err, ClientError::Http(e) if e.is_timeout() || e.is_connect())
}
