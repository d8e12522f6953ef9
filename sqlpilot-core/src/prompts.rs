//! Prompt builders for the three LLM stages.
//!
//! Every stage sends one system prompt and one user prompt. The wording here
//! is not load-bearing; only the reply shapes the decoders expect are.

use crate::diagnostics::SqlError;
use crate::models::{DatabaseType, IntentAnalysis, RetrievedSchemaContext};
use std::fmt::Write as _;

pub(crate) const INTENT_SYSTEM_PROMPT: &str = "You analyse questions about a relational database. \
Reply with a single JSON object with the keys: \
\"operation\" (one of LIST, COUNT, AGGREGATE, DETAIL, SCHEMA), \
\"target_entity\" (the main table the question is about, or null), \
\"metrics\" (array of column names or expressions to compute), \
\"filters\" (array of {\"field\", \"operator\", \"value\"}), \
\"needs_clarification\" (true only when the question cannot be answered without more information) and \
\"clarification_question\" (the question to ask the user, or null). \
Use only table names from the provided list.";

pub(crate) const CORRECTION_SYSTEM_PROMPT: &str = "You fix failing read-only SQL queries. \
Use only the tables and columns listed in the schema. Never produce statements that modify data or schema. \
Reply with a single JSON object: {\"corrected_sql\": \"...\", \"reasoning\": \"...\"}.";

/// System prompt for SQL generation in `dialect`.
pub(crate) fn sql_system_prompt(dialect: DatabaseType) -> String {
    format!(
        "You write a single read-only {} SELECT statement answering the user's question. \
         Use only the tables, columns and relationships in the provided schema. \
         Reply with the SQL only, without explanation.",
        dialect
    )
}

/// User prompt for intent extraction.
pub(crate) fn intent_user_prompt(question: &str, table_names: &[String]) -> String {
    format!(
        "Available tables: {}\n\nQuestion: {}",
        table_names.join(", "),
        question
    )
}

/// User prompt for SQL generation.
pub(crate) fn sql_user_prompt(
    question: &str,
    intent: &IntentAnalysis,
    context: &RetrievedSchemaContext,
) -> String {
    format!(
        "Schema:\n{}\nIntent:\n{}\n\nQuestion: {}",
        format_schema_context(context),
        format_intent(intent),
        question
    )
}

/// User prompt for correcting `failed_sql`.
pub(crate) fn correction_user_prompt(
    question: &str,
    failed_sql: &str,
    raw_error: &str,
    classified: &SqlError,
    context: &RetrievedSchemaContext,
    intent: &IntentAnalysis,
) -> String {
    format!(
        "Schema:\n{}\nIntent:\n{}\n\nQuestion: {}\n\nFailed SQL:\n{}\n\nDatabase error:\n{}\n\nDiagnosis:\n{}",
        format_schema_context(context),
        format_intent(intent),
        question,
        failed_sql,
        raw_error,
        classified.diagnostic_summary()
    )
}

/// Renders tables, columns and relationships as compact text.
pub fn format_schema_context(context: &RetrievedSchemaContext) -> String {
    let mut text = String::new();

    for table in &context.tables {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let mut column = format!("{} {}", c.name, c.data_type);
                if c.is_primary_key {
                    column.push_str(" PK");
                }
                if c.is_foreign_key {
                    column.push_str(" FK");
                }
                column
            })
            .collect();
        let _ = writeln!(text, "Table {} ({})", table.qualified_name(), columns.join(", "));
    }

    if !context.relationships.is_empty() {
        text.push_str("Relationships:\n");
        for r in &context.relationships {
            let _ = writeln!(
                text,
                "  {}.{} -> {}.{}",
                r.from_table, r.from_column, r.to_table, r.to_column
            );
        }
    }

    text
}

fn format_intent(intent: &IntentAnalysis) -> String {
    let mut text = format!("operation: {}", intent.operation);
    if let Some(target) = &intent.target_entity {
        let _ = write!(text, "\ntarget: {}", target);
    }
    if !intent.metrics.is_empty() {
        let _ = write!(text, "\nmetrics: {}", intent.metrics.join(", "));
    }
    for filter in &intent.filters {
        let _ = write!(
            text,
            "\nfilter: {} {} {}",
            filter.field, filter.operator, filter.value
        );
    }
    text
}
