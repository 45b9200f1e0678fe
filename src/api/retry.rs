//! The two retry layers used by the HTTP adapter.
//!
//! [`send_with_backoff`] retries a single send when the server answers with
//! one of the configured statuses, sleeping `base * 2^n` between sends.
//! [`with_jitter`] wraps a whole request/response exchange and retries it on
//! transient errors with a random delay. Both are bounded by
//! [`RetryConfig::max_attempts`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Delay before retry number `retry_count` (0-indexed): `base * 2^retry_count`.
#[must_use]
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(retry_count))
}

/// Picks a uniformly random delay in `[jitter_min_ms, jitter_max_ms]`.
#[must_use]
pub fn jitter_delay(policy: &RetryConfig) -> Duration {
    let low = policy.jitter_min_ms.min(policy.jitter_max_ms);
    let high = policy.jitter_min_ms.max(policy.jitter_max_ms);
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

/// Sends the request built by `build`, re-sending while the response status
/// is in `policy.retry_statuses`.
///
/// # Errors
///
/// Returns [`Error::Http`] if a send fails outright and
/// [`Error::RetriesExhausted`] if every attempt hit a retryable status.
pub async fn send_with_backoff<F>(policy: &RetryConfig, mut build: F) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = build().send().await?;
        attempt += 1;

        let status = response.status().as_u16();
        if !policy.retry_statuses.contains(&status) {
            return Ok(response);
        }
        if attempt >= policy.max_attempts {
            return Err(Error::RetriesExhausted {
                status,
                attempts: attempt,
            });
        }

        let delay = retry_delay(attempt - 1, policy.backoff_base());
        log::warn!(
            "{} answered {status}, retrying in {delay:?} ({attempt}/{})",
            response.url(),
            policy.max_attempts
        );
        tokio::time::sleep(delay).await;
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` attempts have been made.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn with_jitter<T, F, Fut>(policy: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                log::warn!(
                    "{what} failed (attempt {attempt}/{}): {e}",
                    policy.max_attempts
                );
                tokio::time::sleep(jitter_delay(policy)).await;
                attempt += 1;
            }
            Err(e) => {
                log::error!("{what} failed after {attempt} attempt(s): {e}");
                return Err(e);
            }
        }
    }
}
