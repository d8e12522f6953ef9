//! Ordered recognizers mapping raw failure text to [`SqlError`].

use super::models::{SqlError, SqlErrorType};
use crate::error::SqlPilotError;
use crate::llm::LlmError;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Cooldown applied to rate-limited LLM calls when the provider declares none.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

/// Pre-compiled identifier extractors.
///
/// Uses `OnceLock` for thread-safe lazy initialization.
struct ExtractionPatterns {
    parameter: Vec<Regex>,
    column: Vec<Regex>,
    table: Vec<Regex>,
    syntax: Vec<Regex>,
    ambiguous: Vec<Regex>,
    conversion: Vec<Regex>,
    missing_column: Regex,
    placeholder: Regex,
}

impl ExtractionPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<ExtractionPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        let build = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("Invalid extraction pattern"))
                .collect()
        };

        Self {
            parameter: build(&[
                r#"(?i)must declare the scalar variable "([^"]+)""#,
                r"(?i)expects the parameter '([^']+)'",
            ]),
            column: build(&[
                r"(?i)invalid column name '([^']+)'",
                r"(?i)unknown column '([^']+)'",
                r"(?i)no such column: ([\w\.]+)",
                r#"(?i)column "([^"]+)" does not exist"#,
                r"(?i)column ([\w\.]+) does not exist",
            ]),
            table: build(&[
                r"(?i)invalid object name '([^']+)'",
                r"(?i)no such table: ([\w\.]+)",
                r#"(?i)relation "([^"]+)" does not exist"#,
                r"(?i)table '([^']+)' doesn't exist",
            ]),
            syntax: build(&[
                r#"(?i)near "([^"]+)""#,
                r"(?i)near '([^']+)'",
            ]),
            ambiguous: build(&[
                r"(?i)ambiguous column name:? '?([\w\.]+)'?",
                r#"(?i)column reference "([^"]+)" is ambiguous"#,
                r"(?i)column '([^']+)' in [\w ]+ is ambiguous",
            ]),
            conversion: build(&[r"(?i)converting the \w+ value '([^']+)'"]),
            missing_column: Regex::new(r#"(?i)column ("[^"]+"|[\w\.]+) does not exist"#)
                .expect("Invalid missing column pattern"),
            placeholder: Regex::new(r"(@\w+|\$\d+|:\w+|\?)").expect("Invalid placeholder pattern"),
        }
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Stateless classifier for database, LLM and vector-store failures.
///
/// Database messages are tested against a fixed recognizer sequence and the
/// first match wins:
/// parameter misuse, invalid column, invalid table, syntax error, ambiguous
/// column, type mismatch, permission denied, connection failure, timeout.
#[derive(Debug, Clone)]
pub struct SqlErrorAnalyzer {
    rate_limit_cooldown: Duration,
}

impl Default for SqlErrorAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlErrorAnalyzer {
    /// Creates an analyzer using the default 60s rate-limit cooldown.
    pub fn new() -> Self {
        Self {
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }

    /// Overrides the cooldown attached to rate-limit classifications.
    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    /// Classifies a raw database engine error for the statement that caused it.
    pub fn analyze_error(&self, error_message: &str, failed_sql: &str) -> SqlError {
        let patterns = ExtractionPatterns::instance();
        let lower = error_message.to_lowercase();

        let error = if contains_any(
            &lower,
            &["must declare the scalar variable", "no value supplied", "bind message supplies"],
        ) || (lower.contains("parameter") && lower.contains("expects"))
        {
            let element = first_capture(&patterns.parameter, error_message).or_else(|| {
                patterns
                    .placeholder
                    .find(failed_sql)
                    .map(|m| m.as_str().to_string())
            });
            let fix = match &element {
                Some(name) => format!(
                    "Replace the placeholder {} with a literal value; generated queries cannot bind parameters",
                    name
                ),
                None => "Inline literal values instead of parameter placeholders".to_string(),
            };
            SqlError::new(SqlErrorType::ParameterMisuse, error_message)
                .with_invalid_element(element)
                .with_suggested_fix(fix)
        } else if contains_any(&lower, &["invalid column name", "unknown column", "no such column"])
            || patterns.missing_column.is_match(error_message)
        {
            let element = first_capture(&patterns.column, error_message);
            let fix = match &element {
                Some(name) => format!(
                    "Column '{}' does not exist; use a column listed in the schema context",
                    name
                ),
                None => "Use only columns listed in the schema context".to_string(),
            };
            SqlError::new(SqlErrorType::InvalidColumn, error_message)
                .with_invalid_element(element)
                .with_suggested_fix(fix)
        } else if contains_any(&lower, &["invalid object name", "no such table", "doesn't exist"])
            || (lower.contains("relation") && lower.contains("does not exist"))
        {
            let element = first_capture(&patterns.table, error_message);
            let fix = match &element {
                Some(name) => format!(
                    "Table '{}' does not exist; use a table listed in the schema context",
                    name
                ),
                None => "Use only tables listed in the schema context".to_string(),
            };
            SqlError::new(SqlErrorType::InvalidTable, error_message)
                .with_invalid_element(element)
                .with_suggested_fix(fix)
        } else if contains_any(&lower, &["incorrect syntax", "syntax error"])
            || patterns.syntax.iter().any(|re| re.is_match(error_message))
        {
            let element = first_capture(&patterns.syntax, error_message);
            let fix = match &element {
                Some(token) => format!("Check the SQL syntax near '{}'", token),
                None => "Check the SQL syntax for the target dialect".to_string(),
            };
            SqlError::new(SqlErrorType::SyntaxError, error_message)
                .with_invalid_element(element)
                .with_suggested_fix(fix)
        } else if contains_any(&lower, &["ambiguous column", "is ambiguous"]) {
            let element = first_capture(&patterns.ambiguous, error_message);
            let fix = match &element {
                Some(name) => format!("Qualify '{}' with its table name or alias", name),
                None => "Qualify column references with table names or aliases".to_string(),
            };
            SqlError::new(SqlErrorType::AmbiguousColumn, error_message)
                .with_invalid_element(element)
                .with_suggested_fix(fix)
        } else if contains_any(
            &lower,
            &["conversion failed", "type mismatch", "operator does not exist", "invalid input syntax"],
        ) {
            let element = first_capture(&patterns.conversion, error_message);
            SqlError::new(SqlErrorType::TypeMismatch, error_message)
                .with_invalid_element(element)
                .with_suggested_fix(
                    "Compare values of compatible types; add an explicit CAST where needed",
                )
        } else if contains_any(&lower, &["permission denied", "access denied", "not authorized"]) {
            SqlError::new(SqlErrorType::PermissionDenied, error_message)
                .with_suggested_fix("Grant SELECT on the referenced objects to the database user")
        } else if contains_any(
            &lower,
            &["connection", "network", "could not connect", "server closed", "broken pipe"],
        ) {
            SqlError::new(SqlErrorType::ConnectionFailed, error_message)
                .with_suggested_fix("Check that the database server is reachable")
        } else if contains_any(&lower, &["timeout", "timed out"]) {
            SqlError::new(SqlErrorType::QueryTimeout, error_message)
                .with_suggested_fix("Narrow the query with filters or a smaller row limit")
        } else {
            SqlError::new(SqlErrorType::Unknown, error_message)
        };

        tracing::debug!(
            error_type = ?error.error_type,
            code = %error.code,
            strategy = %error.recommended_strategy,
            sql_len = failed_sql.len(),
            "Classified database error"
        );
        error
    }

    /// Classifies a failed text-generation call.
    ///
    /// Quota exhaustion is checked before rate limiting because providers
    /// report both with status 429.
    pub fn analyze_llm_error(&self, error: &LlmError) -> SqlError {
        let lower = error.message.to_lowercase();
        let status = error.status;

        let classified = if contains_any(&lower, &["quota", "insufficient_quota", "billing"]) {
            SqlError::new(SqlErrorType::QuotaExceeded, &error.message)
                .with_suggested_fix("Check the provider account's plan and billing details")
        } else if matches!(status, Some(401 | 403))
            || contains_any(&lower, &["invalid api key", "invalid_api_key", "unauthorized"])
        {
            SqlError::new(SqlErrorType::InvalidApiKey, &error.message)
                .with_suggested_fix("Set a valid OPENAI_API_KEY")
        } else if status == Some(429) || contains_any(&lower, &["rate limit", "rate_limit"]) {
            SqlError::new(SqlErrorType::RateLimited, &error.message)
                .with_retry_after(error.retry_after.unwrap_or(self.rate_limit_cooldown))
                .with_suggested_fix("Wait for the provider cooldown before retrying")
        } else if matches!(status, Some(500..=599))
            || contains_any(&lower, &["service unavailable", "overloaded", "bad gateway"])
        {
            SqlError::new(SqlErrorType::ServiceUnavailable, &error.message)
        } else if error.timed_out || contains_any(&lower, &["timeout", "timed out"]) {
            SqlError::new(SqlErrorType::LlmTimeout, &error.message)
        } else if status == Some(400) || lower.contains("bad request") {
            SqlError::new(SqlErrorType::BadRequest, &error.message)
        } else {
            SqlError::new(SqlErrorType::LlmUnknown, &error.message)
        };

        tracing::debug!(
            error_type = ?classified.error_type,
            status = ?status,
            strategy = %classified.recommended_strategy,
            "Classified LLM error"
        );
        classified
    }

    /// Classifies an embedding or vector-index failure.
    pub fn analyze_vector_store_error(&self, error: &SqlPilotError) -> SqlError {
        let message = error.to_string();
        let lower = message.to_lowercase();

        match error {
            SqlPilotError::Embedding { .. } | SqlPilotError::Llm(_) => {
                SqlError::new(SqlErrorType::EmbeddingFailed, message)
            }
            _ if contains_any(
                &lower,
                &["not found", "doesn't exist", "does not exist", "not indexed"],
            ) =>
            {
                SqlError::new(SqlErrorType::NotIndexed, message)
                    .with_suggested_fix("Rebuild the schema index")
            }
            _ => SqlError::new(SqlErrorType::VectorStoreUnavailable, message)
                .with_suggested_fix("Check that the vector store is reachable"),
        }
    }
}
