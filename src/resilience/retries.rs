//! Retry-on-write for optimistic concurrency.
//!
//! # Responsibilities
//! - Re-run a read-modify-write closure when the compare-and-swap loses
//! - Back off with jitter between attempts
//! - Give up after `max_attempts` and surface the last conflict
//!
//! Only `CrmError::VersionConflict` is retried; every other error returns
//! immediately.

use std::future::Future;

use crate::config::RetryConfig;
use crate::error::{CrmError, CrmResult};
use crate::observability::metrics;
use crate::resilience::backoff::backoff_for;

/// Whether an error is worth another write attempt.
pub fn is_retryable(error: &CrmError) -> bool {
    matches!(error, CrmError::VersionConflict { .. })
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn retry_on_conflict<T, F, Fut>(config: &RetryConfig, mut op: F) -> CrmResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = CrmResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < max_attempts => {
                let delay = backoff_for(config, attempt);
                if let CrmError::VersionConflict { entity, id, .. } = &e {
                    metrics::record_write_retry(*entity);
                    tracing::debug!(entity = *entity, id = %id, attempt, delay = ?delay, "Write conflict, retrying");
                }
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if is_retryable(&e) {
                    tracing::warn!(attempt, error = %e, "Write conflict, giving up");
                }
                return Err(e);
            }
        }
    }
}
