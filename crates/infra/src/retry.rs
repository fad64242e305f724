use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{EngineError, EngineResult};

const BASE_BACKOFF_MS: u64 = 5;

/// Run `attempt` until it succeeds, fails with a non-conflict error, or has
/// conflicted `max_attempts` times. Each call must start a fresh transaction.
pub async fn retry_on_conflict<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    mut attempt: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        match attempt().await {
            Err(err) if err.is_conflict() => {
                debug!(operation, attempt = n, error = %err, "transaction conflict, retrying");
                if n < max_attempts {
                    tokio::time::sleep(Duration::from_millis(BASE_BACKOFF_MS << (n - 1).min(6))).await;
                }
            }
            other => return other,
        }
    }
    Err(EngineError::RetriesExhausted {
        operation,
        attempts: max_attempts,
    })
}
