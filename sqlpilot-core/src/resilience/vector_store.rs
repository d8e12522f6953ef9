//! Vector-store handler: backoff around embedding and index calls.

use super::{DEFAULT_WAIT_INTERVAL, HandlerError, Pacing, retry_classified};
use crate::diagnostics::{SqlError, SqlErrorAnalyzer};
use crate::error::SqlPilotError;
use std::future::Future;

/// Wraps embedding and vector-index calls.
///
/// A missing collection classifies as `NotIndexed` and is never retried;
/// unavailability and embedding failures back off exponentially.
#[derive(Debug, Clone, Default)]
pub struct VectorStoreHandler {
    analyzer: SqlErrorAnalyzer,
}

impl VectorStoreHandler {
    /// Creates a handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation`, retrying its failures per their classification.
    ///
    /// # Errors
    /// Returns the [`HandlerError`] produced once retrying stops.
    pub async fn call<T, Op, Fut>(&self, mut operation: Op) -> Result<T, HandlerError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(error) => {
                let classified = self.analyzer.analyze_vector_store_error(&error);
                tracing::warn!(
                    error_type = ?classified.error_type,
                    strategy = %classified.recommended_strategy,
                    "Vector store call failed"
                );
                self.handle(operation, classified).await
            }
        }
    }

    /// Re-runs a failed vector-store call under its classified policy.
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
        Fut: Future<Output = crate::Result<T>>,
    {
        retry_classified(
            "vector_store",
            operation,
            classified,
            |error: &SqlPilotError| self.analyzer.analyze_vector_store_error(error),
            Pacing::Fixed(DEFAULT_WAIT_INTERVAL),
        )
        .await
    }
}
