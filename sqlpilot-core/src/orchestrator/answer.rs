//! Natural-language answers from execution results.

use crate::models::{IntentAnalysis, QueryOperation, SqlExecutionResult, final_segment};
use serde_json::Value;

/// Values listed inline for single-column results.
const PREVIEW_VALUES: usize = 5;

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The only value of a one-row, one-column result.
fn single_value(result: &SqlExecutionResult) -> Option<&Value> {
    match result.rows.as_slice() {
        [row] if row.len() == 1 => row.values().next(),
        _ => None,
    }
}

fn entity_label(intent: &IntentAnalysis) -> String {
    intent
        .target_entity
        .as_deref()
        .map(|t| final_segment(t).to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "matching rows".to_string())
}

fn count_answer(intent: &IntentAnalysis, result: &SqlExecutionResult) -> Option<String> {
    let count = single_value(result)?;
    if !count.is_number() {
        return None;
    }
    Some(format!(
        "The number of {} is {}.",
        entity_label(intent),
        display_value(count)
    ))
}

fn aggregate_answer(result: &SqlExecutionResult) -> Option<String> {
    let [row] = result.rows.as_slice() else {
        return None;
    };
    let parts: Vec<String> = row
        .iter()
        .map(|(column, value)| format!("{} = {}", column, display_value(value)))
        .collect();
    Some(format!("Result: {}.", parts.join(", ")))
}

fn rows_answer(result: &SqlExecutionResult) -> String {
    let count = result.row_count();
    if count == 0 {
        return "No matching rows were found.".to_string();
    }

    let noun = if count == 1 { "row" } else { "rows" };
    let single_column = result.rows.iter().all(|row| row.len() == 1);
    if !single_column {
        return format!("Found {} {}.", count, noun);
    }

    let preview: Vec<String> = result
        .rows
        .iter()
        .filter_map(|row| row.values().next())
        .take(PREVIEW_VALUES)
        .map(display_value)
        .collect();
    let more = if count > PREVIEW_VALUES { ", ..." } else { "" };
    format!("Found {} {}: {}{}.", count, noun, preview.join(", "), more)
}

/// Formats the answer for `intent` from the final execution result.
///
/// A notice is prepended when the statement needed corrections.
pub fn format_answer(
    intent: &IntentAnalysis,
    result: &SqlExecutionResult,
    corrections: usize,
) -> String {
    let body = if !result.success {
        format!(
            "The query could not be completed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        )
    } else {
        match intent.operation {
            QueryOperation::Count => count_answer(intent, result),
            QueryOperation::Aggregate => aggregate_answer(result),
            _ => None,
        }
        .unwrap_or_else(|| rows_answer(result))
    };

    match corrections {
        0 => body,
        1 => format!("(The query was corrected once.) {}", body),
        n => format!("(The query was corrected {} times.) {}", n, body),
    }
}
