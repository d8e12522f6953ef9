//! Tests for the error analyzers.

use super::*;
use crate::error::SqlPilotError;
use crate::llm::LlmError;
use proptest::prelude::*;
use std::time::Duration;

fn analyze(message: &str) -> SqlError {
    SqlErrorAnalyzer::new().analyze_error(message, "SELECT 1")
}

// =============================================================================
// Database recognizers
// =============================================================================

#[test]
fn test_parameter_misuse() {
    let error = analyze(r#"Must declare the scalar variable "@CustomerId"."#);
    assert_eq!(error.error_type, SqlErrorType::ParameterMisuse);
    assert_eq!(error.code, "SQL001");
    assert_eq!(error.invalid_element.as_deref(), Some("@CustomerId"));

    let error = SqlErrorAnalyzer::new().analyze_error(
        "bind message supplies 0 parameters, but prepared statement \"\" requires 1",
        "SELECT * FROM orders WHERE id = $1",
    );
    assert_eq!(error.error_type, SqlErrorType::ParameterMisuse);
    assert_eq!(error.invalid_element.as_deref(), Some("$1"));
}

#[test]
fn test_invalid_column_variants() {
    let cases = [
        ("no such column: CustomerName", "CustomerName"),
        ("Invalid column name 'CustomerName'.", "CustomerName"),
        ("Unknown column 'CustomerName' in 'field list'", "CustomerName"),
        (r#"column "customername" does not exist"#, "customername"),
        ("column c.customername does not exist", "c.customername"),
    ];

    for (message, element) in cases {
        let error = analyze(message);
        assert_eq!(error.error_type, SqlErrorType::InvalidColumn, "{}", message);
        assert_eq!(error.invalid_element.as_deref(), Some(element), "{}", message);
        assert!(error.is_recoverable);
        assert_eq!(error.recommended_strategy, RetryStrategy::ImmediateRetry);
        assert_eq!(error.max_retry_attempts, 2);
    }
}

#[test]
fn test_invalid_table_variants() {
    let cases = [
        ("no such table: Clients", "Clients"),
        ("Invalid object name 'dbo.Clients'.", "dbo.Clients"),
        (r#"relation "clients" does not exist"#, "clients"),
        ("Table 'shop.clients' doesn't exist", "shop.clients"),
    ];

    for (message, element) in cases {
        let error = analyze(message);
        assert_eq!(error.error_type, SqlErrorType::InvalidTable, "{}", message);
        assert_eq!(error.code, "SQL003");
        assert_eq!(error.invalid_element.as_deref(), Some(element), "{}", message);
    }
}

#[test]
fn test_syntax_error() {
    let error = analyze(r#"near "FORM": syntax error"#);
    assert_eq!(error.error_type, SqlErrorType::SyntaxError);
    assert_eq!(error.invalid_element.as_deref(), Some("FORM"));

    let error = analyze("Incorrect syntax near 'LIMIT'.");
    assert_eq!(error.error_type, SqlErrorType::SyntaxError);
    assert_eq!(error.invalid_element.as_deref(), Some("LIMIT"));
}

#[test]
fn test_ambiguous_column() {
    let error = analyze("ambiguous column name: Id");
    assert_eq!(error.error_type, SqlErrorType::AmbiguousColumn);
    assert_eq!(error.severity, ErrorSeverity::Low);
    assert_eq!(error.invalid_element.as_deref(), Some("Id"));

    let error = analyze(r#"column reference "id" is ambiguous"#);
    assert_eq!(error.error_type, SqlErrorType::AmbiguousColumn);
    assert_eq!(error.invalid_element.as_deref(), Some("id"));
}

#[test]
fn test_type_mismatch() {
    let error = analyze("operator does not exist: integer = text");
    assert_eq!(error.error_type, SqlErrorType::TypeMismatch);
    assert_eq!(error.code, "SQL006");

    let error = analyze("Conversion failed when converting the varchar value 'abc' to data type int.");
    assert_eq!(error.error_type, SqlErrorType::TypeMismatch);
    assert_eq!(error.invalid_element.as_deref(), Some("abc"));
}

#[test]
fn test_permission_denied_is_terminal() {
    let error = analyze("permission denied for table salaries");
    assert_eq!(error.error_type, SqlErrorType::PermissionDenied);
    assert_eq!(error.severity, ErrorSeverity::High);
    assert!(!error.is_recoverable);
    assert_eq!(error.recommended_strategy, RetryStrategy::NoRetry);
}

#[test]
fn test_connection_failure_uses_circuit_breaker() {
    let error = analyze("could not connect to server: Connection refused");
    assert_eq!(error.error_type, SqlErrorType::ConnectionFailed);
    assert_eq!(error.category, ErrorCategory::Network);
    assert_eq!(error.recommended_strategy, RetryStrategy::CircuitBreaker);
    assert_eq!(error.max_retry_attempts, 3);
}

#[test]
fn test_timeout_is_terminal() {
    let error = analyze("Query timed out after 30s");
    assert_eq!(error.error_type, SqlErrorType::QueryTimeout);
    assert_eq!(error.code, "DB003");
    assert!(!error.is_recoverable);
}

#[test]
fn test_unknown_message() {
    let error = analyze("something unexpected happened");
    assert_eq!(error.error_type, SqlErrorType::Unknown);
    assert_eq!(error.code, "ERR000");
    assert_eq!(error.category, ErrorCategory::Internal);
    assert_eq!(error.recommended_strategy, RetryStrategy::NoRetry);
}

/// First match wins: a syntax error mentioning "timeout" in a literal stays a syntax error.
#[test]
fn test_recognizer_order_is_tie_break() {
    let error = analyze(r#"near "'timeout'": syntax error"#);
    assert_eq!(error.error_type, SqlErrorType::SyntaxError);

    let error = analyze("no such column: connection_timeout");
    assert_eq!(error.error_type, SqlErrorType::InvalidColumn);

    let error = analyze("permission denied: connection to reporting schema");
    assert_eq!(error.error_type, SqlErrorType::PermissionDenied);
}

// =============================================================================
// LLM recognizers
// =============================================================================

#[test]
fn test_llm_rate_limit_uses_retry_after() {
    let analyzer = SqlErrorAnalyzer::new();

    let error = LlmError::new("Rate limit reached for requests").with_status(429);
    let classified = analyzer.analyze_llm_error(&error);
    assert_eq!(classified.error_type, SqlErrorType::RateLimited);
    assert_eq!(classified.recommended_strategy, RetryStrategy::WaitAndRetry);
    assert_eq!(classified.max_retry_attempts, 3);
    assert_eq!(classified.retry_after, Some(DEFAULT_RATE_LIMIT_COOLDOWN));

    let error = error.with_retry_after(Duration::from_secs(7));
    let classified = analyzer.analyze_llm_error(&error);
    assert_eq!(classified.retry_after, Some(Duration::from_secs(7)));
}

#[test]
fn test_llm_quota_checked_before_rate_limit() {
    let error = LlmError::new("You exceeded your current quota (insufficient_quota)").with_status(429);
    let classified = SqlErrorAnalyzer::new().analyze_llm_error(&error);
    assert_eq!(classified.error_type, SqlErrorType::QuotaExceeded);
    assert_eq!(classified.severity, ErrorSeverity::Critical);
    assert_eq!(classified.recommended_strategy, RetryStrategy::NoRetry);
}

#[test]
fn test_llm_status_mapping() {
    let analyzer = SqlErrorAnalyzer::new();
    let cases = [
        (Some(401), "Incorrect API key provided", SqlErrorType::InvalidApiKey),
        (Some(503), "The engine is currently overloaded", SqlErrorType::ServiceUnavailable),
        (Some(400), "Invalid 'messages' parameter", SqlErrorType::BadRequest),
        (None, "strange failure", SqlErrorType::LlmUnknown),
    ];

    for (status, message, expected) in cases {
        let mut error = LlmError::new(message);
        error.status = status;
        assert_eq!(analyzer.analyze_llm_error(&error).error_type, expected, "{}", message);
    }

    let timeout = LlmError::timeout("request timed out");
    let classified = analyzer.analyze_llm_error(&timeout);
    assert_eq!(classified.error_type, SqlErrorType::LlmTimeout);
    assert_eq!(classified.recommended_strategy, RetryStrategy::ImmediateRetry);

    let unknown = analyzer.analyze_llm_error(&LlmError::new("strange failure"));
    assert_eq!(unknown.recommended_strategy, RetryStrategy::Fallback);
}

// =============================================================================
// Vector store recognizers
// =============================================================================

#[test]
fn test_vector_store_classification() {
    let analyzer = SqlErrorAnalyzer::new();

    let classified = analyzer.analyze_vector_store_error(&SqlPilotError::embedding("HTTP 500"));
    assert_eq!(classified.error_type, SqlErrorType::EmbeddingFailed);
    assert_eq!(classified.recommended_strategy, RetryStrategy::ExponentialBackoff);

    let classified = analyzer
        .analyze_vector_store_error(&SqlPilotError::vector_store("Collection schema_shop not found"));
    assert_eq!(classified.error_type, SqlErrorType::NotIndexed);
    assert!(!classified.is_recoverable);

    let classified =
        analyzer.analyze_vector_store_error(&SqlPilotError::vector_store("connection refused"));
    assert_eq!(classified.error_type, SqlErrorType::VectorStoreUnavailable);
    assert_eq!(classified.max_retry_attempts, 2);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_analysis_is_deterministic_and_consistent(message in ".{0,120}", sql in ".{0,60}") {
        let analyzer = SqlErrorAnalyzer::new();
        let first = analyzer.analyze_error(&message, &sql);
        let second = analyzer.analyze_error(&message, &sql);

        prop_assert_eq!(first.error_type, second.error_type);
        prop_assert_eq!(&first.code, &second.code);
        prop_assert_eq!(first.is_recoverable, second.is_recoverable);
        prop_assert_eq!(first.recommended_strategy, second.recommended_strategy);
        prop_assert_eq!(&first.invalid_element, &second.invalid_element);
        prop_assert!(first.is_consistent());
    }

    #[test]
    fn prop_llm_analysis_is_consistent(message in ".{0,80}", status in proptest::option::of(100u16..600)) {
        let mut error = LlmError::new(message);
        error.status = status;
        let classified = SqlErrorAnalyzer::new().analyze_llm_error(&error);
        prop_assert!(classified.is_consistent());
    }

    #[test]
    fn prop_known_column_messages_extract_identifier(name in "[A-Za-z_][A-Za-z0-9_]{0,10}") {
        let error = SqlErrorAnalyzer::new().analyze_error(&format!("no such column: {}", name), "SELECT 1");
        prop_assert_eq!(error.error_type, SqlErrorType::InvalidColumn);
        prop_assert_eq!(error.invalid_element, Some(name));
    }
}
