//! MySQL statement execution and row conversion.

use crate::Result;
use crate::adapters::map_execution_error;
use crate::models::QueryRows;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Row};

/// Runs one statement and converts every row to a JSON object.
pub(super) async fn execute(conn: &mut MySqlConnection, sql: &str) -> Result<QueryRows> {
    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_execution_error)?;

    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    Ok(QueryRows {
        columns,
        rows: rows.iter().map(row_to_json).collect(),
    })
}

fn row_to_json(row: &MySqlRow) -> serde_json::Map<String, JsonValue> {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        map.insert(
            column.name().to_string(),
            extract_column_value(row, column.ordinal()),
        );
    }
    map
}

/// Extract a column value as a JSON value.
fn extract_column_value(row: &MySqlRow, index: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(JsonValue::Bool).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|ts| JsonValue::String(ts.to_string()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| JsonValue::String(d.to_string()))
            .unwrap_or(JsonValue::Null);
    }
    // DECIMAL travels as text in the binary protocol
    if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(index) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }

    JsonValue::Null
}
