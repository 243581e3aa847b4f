//! Async retry execution.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{GenerationError, RetryPolicy};
use tracing::{debug, warn};

use crate::traits::{GenerateRequest, GenerateResponse, Generator};

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// Non-retryable failures are returned unchanged. A retryable failure on the
/// last allowed attempt is wrapped in [`GenerationError::Exhausted`].
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !policy.is_retryable(&err) => {
                debug!(operation, attempt, error = %err, "Non-retryable failure");
                return Err(err);
            }
            Err(err) if !policy.should_retry(&err, attempt) => {
                warn!(operation, attempts = attempt, error = %err, "Retry budget exhausted");
                return Err(GenerationError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.delay_for_retry(attempt - 1);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// A generator that retries another generator under a [`RetryPolicy`].
pub struct RetryingGenerator {
    inner: Arc<dyn Generator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    /// Wrap a generator.
    pub fn new(inner: Arc<dyn Generator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Get the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        let inner = Arc::clone(&self.inner);
        retry_with_policy(&self.policy, inner.id(), || {
            let inner = Arc::clone(&inner);
            let request = request.clone();
            async move { inner.generate(request).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedGenerator;
    use std::time::Duration;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_exp_base(2.0)
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let scripted = Arc::new(ScriptedGenerator::new(vec![
            Err(GenerationError::status("mock", 503, "unavailable")),
            Err(GenerationError::status("mock", 429, "slow down")),
            Ok(GenerateResponse::text("hello")),
        ]));
        let generator = RetryingGenerator::new(scripted.clone(), fast_policy(5));

        let response = generator
            .generate(GenerateRequest::new("m", vec![]))
            .await
            .unwrap();

        assert_eq!(response.content.as_text(), "hello");
        assert_eq!(scripted.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_immediately() {
        let scripted = Arc::new(ScriptedGenerator::new(vec![
            Err(GenerationError::status("mock", 400, "bad request")),
            Ok(GenerateResponse::text("never reached")),
        ]));
        let generator = RetryingGenerator::new(scripted.clone(), fast_policy(5));

        let err = generator
            .generate(GenerateRequest::new("m", vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(400));
        assert!(!matches!(err, GenerationError::Exhausted { .. }));
        assert_eq!(scripted.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_bounded() {
        let scripted = Arc::new(ScriptedGenerator::new(
            (0..10)
                .map(|_| Err(GenerationError::status("mock", 500, "boom")))
                .collect(),
        ));
        let generator = RetryingGenerator::new(scripted.clone(), fast_policy(3));

        let err = generator
            .generate(GenerateRequest::new("m", vec![]))
            .await
            .unwrap_err();

        match err {
            GenerationError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status_code(), Some(500));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(scripted.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_with_policy_on_plain_closure() {
        let mut calls = 0;
        let result: Result<u32, _> = retry_with_policy(&fast_policy(4), "count", || {
            calls += 1;
            let current = calls;
            async move {
                if current < 2 {
                    Err(GenerationError::status("op", 504, "gateway timeout"))
                } else {
                    Ok(current)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
