//! Terminal rendering of answers and schema overviews.

use sqlpilot_core::{AgentResponse, DatabaseSchema, SqlExecutionResult};
use std::fmt::Write as _;

/// Rows printed under an answer; the rest are summarised.
const MAX_DISPLAY_ROWS: usize = 20;

/// Longest cell printed before truncation.
const MAX_CELL_WIDTH: usize = 40;

fn cell(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let truncated: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

/// Renders result rows as an aligned text table.
pub(crate) fn format_rows(result: &SqlExecutionResult) -> String {
    if result.columns.is_empty() || result.rows.is_empty() {
        return String::new();
    }

    let shown = &result.rows[..result.rows.len().min(MAX_DISPLAY_ROWS)];
    let cells: Vec<Vec<String>> = shown
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|c| row.get(c).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&result.columns));
    let _ = writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &cells {
        let _ = writeln!(out, "{}", line(row));
    }
    if result.rows.len() > shown.len() {
        let _ = writeln!(out, "... {} more rows", result.rows.len() - shown.len());
    }
    out
}

/// Renders a response for the terminal.
pub(crate) fn format_response(response: &AgentResponse, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", response.answer);

    if let Some(sql) = &response.sql {
        let _ = writeln!(out, "\nSQL: {}", sql);
    }

    if let Some(result) = response.execution_result.as_ref().filter(|r| r.success) {
        let table = format_rows(result);
        if !table.is_empty() {
            let _ = write!(out, "\n{}", table);
        }
    }

    if !response.success
        && let Some(error) = &response.error_message
        && error != &response.answer
    {
        let _ = writeln!(out, "\nError: {}", error);
    }

    if verbose {
        for attempt in &response.correction_history {
            let _ = writeln!(
                out,
                "\nCorrection {} ({:?}): {}",
                attempt.attempt_number, attempt.error.error_type, attempt.reasoning
            );
        }
        let _ = writeln!(out, "\nSteps: {}", response.processing_steps.join(" -> "));
    }

    out
}

/// Renders the tables, columns and relationships of `schema`.
pub(crate) fn format_schema(schema: &DatabaseSchema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Tables ({}):", schema.tables.len());
    for table in &schema.tables {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                if c.is_primary_key {
                    format!("{} {} PK", c.name, c.data_type)
                } else {
                    format!("{} {}", c.name, c.data_type)
                }
            })
            .collect();
        let _ = writeln!(out, "  {} ({})", table.qualified_name(), columns.join(", "));
    }

    if !schema.relationships.is_empty() {
        let _ = writeln!(out, "Relationships ({}):", schema.relationships.len());
        for relationship in &schema.relationships {
            let _ = writeln!(out, "  {}", relationship);
        }
    }
    out
}
