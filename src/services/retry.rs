use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.persist_max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Runs a store write until it succeeds or the attempts run out, sleeping
/// `backoff * attempt` between tries. Rejections are returned at once.
pub async fn persist_with_retry<T, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rejection() => return Err(e),
            Err(e) => {
                if attempt >= policy.max_attempts {
                    error!(label, attempts = attempt, error = %e, "write failed, giving up");
                    return Err(AppError::persistence(format!(
                        "{} failed after {} attempts: {}",
                        label, attempt, e
                    )));
                }

                warn!(label, attempt, error = %e, "write failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = persist_with_retry("save", &fast(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::ServiceUnavailable("down".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_persistence_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = persist_with_retry("save", &fast(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::ServiceUnavailable("down".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::PersistenceFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = persist_with_retry("save", &fast(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::invalid_data("bad document"))
        })
        .await;

        assert!(matches!(result, Err(AppError::ValidationError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
