//! Caller-side retry for read operations.
//!
//! The chain adapter never retries by itself. Callers that prefer to ride out
//! a flaky node opt in here; only [`HtkError::Rpc`] failures are retried.

use crate::error::HtkError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay_ms: 100,
            max_delay: Duration::from_secs(10),
        }
    }

    pub fn none() -> Self {
        Self::new(0)
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay_ms)
            .factor(2)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_retries)
    }
}

pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    action: F,
) -> Result<T, HtkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HtkError>>,
{
    RetryIf::start(policy.strategy(), action, |err: &HtkError| {
        let retry = err.is_rpc();
        if retry && policy.max_retries > 0 {
            warn!("{} failed, retrying: {}", operation, err);
        }
        retry
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn retries_rpc_errors_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let result = with_retry(fast(3), "eth_call", move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HtkError::rpc("eth_call", "flaky"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let result: Result<(), _> = with_retry(RetryPolicy::none(), "eth_call", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(HtkError::rpc("eth_call", "down")) }
        })
        .await;

        assert!(result.unwrap_err().is_rpc());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let result: Result<(), _> = with_retry(fast(5), "lookup", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(HtkError::NotFound("token".to_string())) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), "not_found");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
