//! Error classification for SQL, LLM and vector-store failures.
//!
//! This module turns raw failure text into a structured [`SqlError`]:
//! - **Database**: ordered recognizers over engine error messages
//! - **LLM**: HTTP status and message inspection for provider failures
//! - **Vector store**: index and embedding failures
//!
//! Classification is pure and deterministic. The resulting error type fixes
//! severity, code, recoverability and the retry strategy the resilience
//! handlers apply.
//!
//! # Example
//! ```rust
//! use sqlpilot_core::diagnostics::{RetryStrategy, SqlErrorAnalyzer, SqlErrorType};
//!
//! let analyzer = SqlErrorAnalyzer::new();
//! let error = analyzer.analyze_error(
//!     "no such column: CustomerName",
//!     "SELECT CustomerName FROM Customers",
//! );
//! assert_eq!(error.error_type, SqlErrorType::InvalidColumn);
//! assert_eq!(error.invalid_element.as_deref(), Some("CustomerName"));
//! assert_eq!(error.recommended_strategy, RetryStrategy::ImmediateRetry);
//! ```

mod analyzer;
mod models;

#[cfg(test)]
mod tests;

pub use analyzer::{DEFAULT_RATE_LIMIT_COOLDOWN, SqlErrorAnalyzer};
pub use models::{
    ErrorCategory, ErrorProfile, ErrorSeverity, RetryStrategy, SqlError, SqlErrorType,
};
