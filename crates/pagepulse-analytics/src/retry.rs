//! Retry with exponential back-off and jitter for the realtime API client.
//!
//! [`retry_with_backoff`] wraps one report request and retries transient
//! failures (network errors, 5xx) and quota rejections (429). Auth,
//! malformed-response and rejected-request errors return immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;

const MAX_DELAY_MS: u64 = 60_000;

/// Attempt budget and base delay for one logical request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    /// Total attempts including the first; zero is treated as one.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

pub(crate) fn is_retriable(err: &ApiError) -> bool {
    matches!(err, ApiError::Transient { .. } | ApiError::Quota { .. })
}

/// Delay before retry number `retry` (1-based), before jitter.
///
/// `base_ms * 2^(retry-1)`, raised to the server's `Retry-After` hint when
/// one was given, capped at 60 s.
pub(crate) fn backoff_delay_ms(retry: u32, backoff_base_ms: u64, hint_secs: Option<u64>) -> u64 {
    let computed = backoff_base_ms.saturating_mul(1u64 << retry.saturating_sub(1).min(20));
    let hinted = hint_secs.map_or(0, |s| s.saturating_mul(1_000));
    computed.max(hinted).min(MAX_DELAY_MS)
}

fn retry_after_hint(err: &ApiError) -> Option<u64> {
    match err {
        ApiError::Quota {
            retry_after_secs, ..
        } => *retry_after_secs,
        _ => None,
    }
}

/// Runs `operation` until it succeeds, fails with a non-retriable error, or
/// `policy.max_attempts` attempts have been made.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Retry | Sleep before it                |
/// |-------|--------------------------------|
/// | 1     | 1 000 ms × 2⁰ ± 25 % jitter    |
/// | 2     | 1 000 ms × 2¹ ± 25 % jitter    |
/// | 3     | 1 000 ms × 2² ± 25 % jitter    |
///
/// The error returned after exhaustion carries the total attempt count.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) {
                    return Err(err);
                }
                if attempt >= max_attempts {
                    return Err(err.with_attempts(attempt));
                }
                let capped = backoff_delay_ms(attempt, policy.backoff_base_ms, None);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                let delay_ms = backoff_delay_ms(1, jittered, retry_after_hint(&err));
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    kind = err.kind().as_str(),
                    error = %err,
                    "analytics API error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
