//! Syntactic SELECT-only allow-list and the default row cap.
//!
//! This is a keyword screen, not a parser. It is conservative on purpose:
//! identifiers are split on underscores too, so a column such as `DROP_COUNT`
//! is rejected along with real `DROP` statements.

use crate::models::DatabaseType;
use regex::Regex;
use std::sync::OnceLock;

/// Keywords that must never appear in generated SQL.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    // data definition
    "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME",
    // data modification
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT",
    // privileges
    "GRANT", "REVOKE", "DENY",
    // procedures and server control
    "EXEC", "EXECUTE", "CALL", "SHUTDOWN", "KILL",
];

fn aggregate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(COUNT|SUM|AVG|MIN|MAX)\s*\(|\bGROUP\s+BY\b")
            .expect("Invalid aggregate pattern")
    })
}

fn existing_limit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bTOP\s*\(?\s*\d+|\bLIMIT\s+\d+|\bFETCH\s+(FIRST|NEXT)\b")
            .expect("Invalid limit pattern")
    })
}

fn select_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bSELECT(\s+DISTINCT)?\b").expect("Invalid select pattern")
    })
}

/// Uppercased words of `sql`; anything but letters and digits separates words.
fn words(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase)
}

/// Reason `sql` is rejected, or `None` when it passes the allow-list.
pub fn rejection_reason(sql: &str) -> Option<String> {
    let mut has_select = false;
    for word in words(sql) {
        if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
            return Some(format!("forbidden keyword {}", word));
        }
        has_select |= word == "SELECT";
    }

    if has_select {
        None
    } else {
        Some("statement is not a SELECT".to_string())
    }
}

/// `true` when `sql` may be executed.
///
/// # Example
/// ```rust
/// use sqlpilot_core::generator::validate_sql;
///
/// assert!(validate_sql("SELECT * FROM T"));
/// assert!(!validate_sql("select 1; drop table T"));
/// assert!(!validate_sql("PRAGMA table_info(T)"));
/// ```
pub fn validate_sql(sql: &str) -> bool {
    rejection_reason(sql).is_none()
}

/// Whether `sql` computes an aggregate or groups rows.
pub fn is_aggregate_query(sql: &str) -> bool {
    aggregate_pattern().is_match(sql)
}

/// Caps the row count of a non-aggregate query without an explicit limit.
///
/// SQL Server gets `TOP n` right after `SELECT` (after `DISTINCT` when
/// present); other engines get a trailing `LIMIT n`. Anything else is
/// returned unchanged.
///
/// # Example
/// ```rust
/// use sqlpilot_core::generator::ensure_limit;
/// use sqlpilot_core::models::DatabaseType;
///
/// assert_eq!(
///     ensure_limit("SELECT Name FROM Customers", 100, DatabaseType::SqlServer),
///     "SELECT TOP 100 Name FROM Customers"
/// );
/// assert_eq!(
///     ensure_limit("SELECT COUNT(*) FROM Customers", 100, DatabaseType::SQLite),
///     "SELECT COUNT(*) FROM Customers"
/// );
/// ```
pub fn ensure_limit(sql: &str, limit: u32, database_type: DatabaseType) -> String {
    if is_aggregate_query(sql) || existing_limit_pattern().is_match(sql) {
        return sql.to_string();
    }

    let statement = sql.trim().trim_end_matches(';').trim_end();

    match database_type {
        DatabaseType::SqlServer => match select_pattern().find(statement) {
            Some(select) => format!(
                "{} TOP {}{}",
                &statement[..select.end()],
                limit,
                &statement[select.end()..]
            ),
            None => sql.to_string(),
        },
        _ => format!("{} LIMIT {}", statement, limit),
    }
}
