//! LLM handler: rate-limit cooldown and backoff around text generation.

use super::{HandlerError, Pacing, SharedCooldown, retry_classified};
use crate::diagnostics::{SqlError, SqlErrorAnalyzer, SqlErrorType};
use crate::llm::LlmError;
use std::future::Future;
use std::time::Duration;

/// Wraps LLM calls with the retry policy of their classified failure.
///
/// All calls through one handler share a single rate-limit clock: when any
/// call is throttled, every caller waits for the same deadline before its
/// next request.
#[derive(Debug, Clone, Default)]
pub struct LlmHandler {
    analyzer: SqlErrorAnalyzer,
    cooldown: SharedCooldown,
}

impl LlmHandler {
    /// Creates a handler whose rate-limit classifications default to `cooldown`.
    pub fn new(rate_limit_cooldown: Duration) -> Self {
        Self {
            analyzer: SqlErrorAnalyzer::new().with_rate_limit_cooldown(rate_limit_cooldown),
            cooldown: SharedCooldown::default(),
        }
    }

    /// The shared rate-limit clock.
    pub fn cooldown(&self) -> &SharedCooldown {
        &self.cooldown
    }

    /// Classifies a failed call, arming the shared cooldown on rate limits.
    pub fn classify(&self, error: &LlmError) -> SqlError {
        let classified = self.analyzer.analyze_llm_error(error);
        if classified.error_type == SqlErrorType::RateLimited
            && let Some(retry_after) = classified.retry_after
        {
            self.cooldown.extend(retry_after);
        }
        classified
    }

    /// Runs `operation`, retrying its failures per their classification.
    ///
    /// # Errors
    /// Returns the [`HandlerError`] produced once retrying stops.
    pub async fn call<T, Op, Fut>(&self, mut operation: Op) -> Result<T, HandlerError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        self.cooldown.wait().await;

        match operation().await {
            Ok(value) => Ok(value),
            Err(error) => {
                let classified = self.classify(&error);
                tracing::warn!(
                    error_type = ?classified.error_type,
                    strategy = %classified.recommended_strategy,
                    "LLM call failed"
                );
                self.handle(operation, classified).await
            }
        }
    }

    /// Re-runs a failed LLM call under its classified policy.
    ///
    /// Quota and credential failures are terminal and never re-run.
    ///
    /// # Errors
    /// Returns the [`HandlerError`] produced once retrying stops.
    pub async fn handle<T, Op, Fut>(
        &self,
        operation: Op,
        classified: SqlError,
    ) -> Result<T, HandlerError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        retry_classified(
            "llm",
            operation,
            classified,
            |error: &LlmError| self.classify(error),
            Pacing::Shared(&self.cooldown),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RetryStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_cooldown() {
        let handler = LlmHandler::new(Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = handler
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(LlmError::new("Rate limit reached").with_status(429))
                    } else {
                        Ok("SELECT 1".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.expect("retry succeeds"), "SELECT 1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_overrides_cooldown() {
        let handler = LlmHandler::new(Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let _ = handler
            .call(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(LlmError::new("slow down")
                            .with_status(429)
                            .with_retry_after(Duration::from_secs(7)))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7));
        assert!(elapsed < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_quota_failure_is_never_retried() {
        let handler = LlmHandler::default();
        let calls = AtomicU32::new(0);

        let result: Result<String, HandlerError> = handler
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(LlmError::new("You exceeded your current quota").with_status(429))
                }
            })
            .await;

        let error = result.expect_err("quota is terminal");
        assert!(matches!(error, HandlerError::Terminal(_)));
        assert_eq!(error.classified().error_type, SqlErrorType::QuotaExceeded);
        assert_eq!(error.classified().recommended_strategy, RetryStrategy::NoRetry);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_failure_falls_back_to_terminal() {
        let handler = LlmHandler::default();
        let calls = AtomicU32::new(0);

        let result: Result<String, HandlerError> = handler
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::new("unexpected end of stream")) }
            })
            .await;

        assert!(matches!(result, Err(HandlerError::Terminal(_))));
        // One call plus the two fallback retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_unavailable_exhausts_with_backoff() {
        let handler = LlmHandler::default();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<String, HandlerError> = handler
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::new("overloaded").with_status(503)) }
            })
            .await;

        assert!(matches!(result, Err(HandlerError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Retries 2 and 3 wait 2s and 4s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }
}
