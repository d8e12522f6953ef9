//! Classified error model.
//!
//! A [`SqlError`] is the structured form of a raw engine, LLM or vector-store
//! failure. Its type fixes the severity, category, error code, recoverability
//! and recommended retry strategy through [`SqlErrorType::profile`], so a
//! non-recoverable classification can never carry a retry strategy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kinds of classified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlErrorType {
    /// Parameter placeholder used without a bound value
    ParameterMisuse,
    /// Column does not exist
    InvalidColumn,
    /// Table or object does not exist
    InvalidTable,
    /// Generic SQL syntax error
    SyntaxError,
    /// Unqualified column matches several tables
    AmbiguousColumn,
    /// Incompatible types in comparison or conversion
    TypeMismatch,
    /// Database user lacks a privilege
    PermissionDenied,
    /// Connection or network failure
    ConnectionFailed,
    /// Statement exceeded the command timeout
    QueryTimeout,
    /// LLM provider throttled the request
    RateLimited,
    /// LLM account quota exhausted
    QuotaExceeded,
    /// LLM credentials rejected
    InvalidApiKey,
    /// LLM provider temporarily unavailable
    ServiceUnavailable,
    /// LLM request timed out
    LlmTimeout,
    /// LLM rejected the request as malformed
    BadRequest,
    /// Unrecognised LLM failure
    LlmUnknown,
    /// Vector store unreachable
    VectorStoreUnavailable,
    /// Schema collection missing from the vector store
    NotIndexed,
    /// Embedding generation failed
    EmbeddingFailed,
    /// Nothing matched
    Unknown,
}

/// Severity of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Subsystem a classified error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Database,
    Llm,
    Network,
    Configuration,
    UserInput,
    Internal,
    VectorStore,
}

/// How a resilience handler should react to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryStrategy {
    /// Fail immediately without re-running the operation
    NoRetry,
    /// Re-run without delay
    ImmediateRetry,
    /// Re-run with `2^(attempt-1)` second delays
    ExponentialBackoff,
    /// Re-run after a fixed delay
    WaitAndRetry,
    /// Re-run behind a consecutive-failure gate
    CircuitBreaker,
    /// Backoff first, then surface a terminal error
    Fallback,
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoRetry => "no_retry",
            Self::ImmediateRetry => "immediate_retry",
            Self::ExponentialBackoff => "exponential_backoff",
            Self::WaitAndRetry => "wait_and_retry",
            Self::CircuitBreaker => "circuit_breaker",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Fixed classification attributes of an error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorProfile {
    pub code: &'static str,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub recoverable: bool,
    pub strategy: RetryStrategy,
    pub max_retry_attempts: u32,
}

const fn recoverable(
    code: &'static str,
    severity: ErrorSeverity,
    category: ErrorCategory,
    strategy: RetryStrategy,
    max_retry_attempts: u32,
) -> ErrorProfile {
    ErrorProfile {
        code,
        severity,
        category,
        recoverable: true,
        strategy,
        max_retry_attempts,
    }
}

const fn terminal(code: &'static str, severity: ErrorSeverity, category: ErrorCategory) -> ErrorProfile {
    ErrorProfile {
        code,
        severity,
        category,
        recoverable: false,
        strategy: RetryStrategy::NoRetry,
        max_retry_attempts: 0,
    }
}

impl SqlErrorType {
    /// Every classification the analyzers can emit.
    pub const ALL: [Self; 20] = [
        Self::ParameterMisuse,
        Self::InvalidColumn,
        Self::InvalidTable,
        Self::SyntaxError,
        Self::AmbiguousColumn,
        Self::TypeMismatch,
        Self::PermissionDenied,
        Self::ConnectionFailed,
        Self::QueryTimeout,
        Self::RateLimited,
        Self::QuotaExceeded,
        Self::InvalidApiKey,
        Self::ServiceUnavailable,
        Self::LlmTimeout,
        Self::BadRequest,
        Self::LlmUnknown,
        Self::VectorStoreUnavailable,
        Self::NotIndexed,
        Self::EmbeddingFailed,
        Self::Unknown,
    ];

    /// Returns the fixed classification attributes for this type.
    pub const fn profile(self) -> ErrorProfile {
        use ErrorCategory as C;
        use ErrorSeverity as S;
        use RetryStrategy as R;

        match self {
            Self::ParameterMisuse => recoverable("SQL001", S::Medium, C::Database, R::ImmediateRetry, 2),
            Self::InvalidColumn => recoverable("SQL002", S::Medium, C::Database, R::ImmediateRetry, 2),
            Self::InvalidTable => recoverable("SQL003", S::Medium, C::Database, R::ImmediateRetry, 2),
            Self::SyntaxError => recoverable("SQL004", S::Medium, C::Database, R::ImmediateRetry, 2),
            Self::AmbiguousColumn => recoverable("SQL005", S::Low, C::Database, R::ImmediateRetry, 2),
            Self::TypeMismatch => recoverable("SQL006", S::Medium, C::Database, R::ImmediateRetry, 2),
            Self::PermissionDenied => terminal("DB001", S::High, C::Database),
            Self::ConnectionFailed => recoverable("DB002", S::High, C::Network, R::CircuitBreaker, 3),
            Self::QueryTimeout => terminal("DB003", S::Medium, C::Database),
            Self::RateLimited => recoverable("LLM001", S::Medium, C::Llm, R::WaitAndRetry, 3),
            Self::QuotaExceeded => terminal("LLM002", S::Critical, C::Llm),
            Self::InvalidApiKey => terminal("LLM003", S::Critical, C::Configuration),
            Self::ServiceUnavailable => {
                recoverable("LLM004", S::High, C::Llm, R::ExponentialBackoff, 3)
            }
            Self::LlmTimeout => recoverable("LLM005", S::Medium, C::Llm, R::ImmediateRetry, 2),
            Self::BadRequest => terminal("LLM006", S::High, C::Llm),
            Self::LlmUnknown => recoverable("LLM999", S::Medium, C::Llm, R::Fallback, 2),
            Self::VectorStoreUnavailable => {
                recoverable("VEC001", S::High, C::VectorStore, R::ExponentialBackoff, 2)
            }
            Self::NotIndexed => terminal("VEC002", S::Medium, C::VectorStore),
            Self::EmbeddingFailed => {
                recoverable("VEC003", S::High, C::VectorStore, R::ExponentialBackoff, 2)
            }
            Self::Unknown => terminal("ERR000", S::Medium, C::Internal),
        }
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlError {
    pub error_type: SqlErrorType,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub invalid_element: Option<String>,
    pub suggested_fix: Option<String>,
    pub is_recoverable: bool,
    pub max_retry_attempts: u32,
    pub recommended_strategy: RetryStrategy,
    /// Provider-declared cooldown, when one was given
    pub retry_after: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

impl SqlError {
    /// Creates a classified error whose attributes come from the type's profile.
    pub fn new(error_type: SqlErrorType, message: impl Into<String>) -> Self {
        let profile = error_type.profile();
        Self {
            error_type,
            severity: profile.severity,
            category: profile.category,
            code: profile.code.to_string(),
            message: message.into(),
            invalid_element: None,
            suggested_fix: None,
            is_recoverable: profile.recoverable,
            max_retry_attempts: profile.max_retry_attempts,
            recommended_strategy: profile.strategy,
            retry_after: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder method to set the offending identifier.
    pub fn with_invalid_element(mut self, element: Option<String>) -> Self {
        self.invalid_element = element;
        self
    }

    /// Builder method to set the suggested fix.
    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Builder method to set a provider-declared cooldown.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Marks the error terminal, clearing its retry budget.
    pub fn into_terminal(mut self) -> Self {
        self.is_recoverable = false;
        self.recommended_strategy = RetryStrategy::NoRetry;
        self.max_retry_attempts = 0;
        self
    }

    /// Overrides the retry strategy of a recoverable error.
    ///
    /// Terminal errors keep `NoRetry` whatever strategy is requested.
    pub fn with_strategy(mut self, strategy: RetryStrategy, max_retry_attempts: u32) -> Self {
        if self.is_recoverable {
            self.recommended_strategy = strategy;
            self.max_retry_attempts = max_retry_attempts;
        }
        self
    }

    /// `false` when the error is non-recoverable yet recommends a retry.
    pub fn is_consistent(&self) -> bool {
        self.is_recoverable || self.recommended_strategy == RetryStrategy::NoRetry
    }

    /// Text passed to the corrector: message, offending element and fix hint.
    pub fn diagnostic_summary(&self) -> String {
        let mut summary = format!("[{}] {:?}: {}", self.code, self.error_type, self.message);
        if let Some(element) = &self.invalid_element {
            summary.push_str(&format!("\nOffending element: {}", element));
        }
        if let Some(fix) = &self.suggested_fix {
            summary.push_str(&format!("\nSuggested fix: {}", fix));
        }
        summary
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.code, self.error_type, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_profile_is_consistent() {
        for error_type in SqlErrorType::ALL {
            let error = SqlError::new(error_type, "x");
            assert!(error.is_consistent(), "{:?} is contradictory", error_type);
            if !error.is_recoverable {
                assert_eq!(error.max_retry_attempts, 0);
            }
        }
    }

    #[test]
    fn test_profile_codes_are_unique() {
        let mut codes: Vec<_> = SqlErrorType::ALL.iter().map(|t| t.profile().code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), SqlErrorType::ALL.len());
    }

    #[test]
    fn test_with_strategy_cannot_revive_terminal_error() {
        let error = SqlError::new(SqlErrorType::PermissionDenied, "denied")
            .with_strategy(RetryStrategy::ImmediateRetry, 5);
        assert_eq!(error.recommended_strategy, RetryStrategy::NoRetry);
        assert_eq!(error.max_retry_attempts, 0);
    }

    #[test]
    fn test_into_terminal() {
        let error = SqlError::new(SqlErrorType::InvalidColumn, "bad column").into_terminal();
        assert!(!error.is_recoverable);
        assert_eq!(error.recommended_strategy, RetryStrategy::NoRetry);
    }

    #[test]
    fn test_diagnostic_summary() {
        let error = SqlError::new(SqlErrorType::InvalidColumn, "no such column: Foo")
            .with_invalid_element(Some("Foo".to_string()))
            .with_suggested_fix("Use an existing column");
        let summary = error.diagnostic_summary();
        assert!(summary.contains("SQL002"));
        assert!(summary.contains("Offending element: Foo"));
        assert!(summary.contains("Suggested fix: Use an existing column"));
    }
}
