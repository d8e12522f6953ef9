//! Core data models for schema metadata, intent and query results.
//!
//! This module defines the structures that flow through the query pipeline:
//! the scanned [`DatabaseSchema`], the per-question
//! [`RetrievedSchemaContext`] and [`IntentAnalysis`], execution results and
//! the final [`AgentResponse`]. All models are serializable so presentation
//! layers can emit them as JSON.

use crate::diagnostics::SqlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SQLite,
    SqlServer,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::PostgreSQL => write!(f, "PostgreSQL"),
            DatabaseType::MySQL => write!(f, "MySQL"),
            DatabaseType::SQLite => write!(f, "SQLite"),
            DatabaseType::SqlServer => write!(f, "SQL Server"),
        }
    }
}

/// Returns the part of a possibly schema-qualified name after the last `.`.
pub fn final_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Compares table names on their final segment, ignoring case.
///
/// `sales.Customers` matches `customers`.
pub fn table_name_matches(a: &str, b: &str) -> bool {
    final_segment(a).eq_ignore_ascii_case(final_segment(b))
}

// =============================================================================
// Schema metadata
// =============================================================================

/// Database column information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

impl ColumnInfo {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            is_foreign_key: false,
        }
    }

    /// Builder method to set nullability.
    pub fn nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }
}

/// Database table information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
}

impl TableInfo {
    /// Creates a table with no columns.
    pub fn new(name: impl Into<String>, schema: Option<String>) -> Self {
        Self {
            name: name.into(),
            schema,
            columns: Vec::new(),
            primary_keys: Vec::new(),
        }
    }

    /// Builder method to set the columns.
    pub fn with_columns(mut self, columns: Vec<ColumnInfo>) -> Self {
        self.columns = columns;
        self
    }

    /// Builder method to set the primary-key column names.
    pub fn with_primary_keys(mut self, primary_keys: Vec<String>) -> Self {
        self.primary_keys = primary_keys;
        self
    }

    /// `schema.name` when the table has a namespace, otherwise `name`.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, self.name),
            _ => self.name.clone(),
        }
    }

    /// Finds a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Foreign-key relationship `from_table.from_column -> to_table.to_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl RelationshipInfo {
    /// Creates a relationship.
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }

    /// Whether `table` is either endpoint.
    pub fn touches(&self, table: &str) -> bool {
        table_name_matches(&self.from_table, table) || table_name_matches(&self.to_table, table)
    }
}

impl std::fmt::Display for RelationshipInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}

/// Snapshot of table, column and relationship metadata for one database.
///
/// Column key flags are derived from `primary_keys` and `relationships` when
/// the snapshot is built, so they always agree with those lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: Vec<TableInfo>,
    pub relationships: Vec<RelationshipInfo>,
    pub scanned_at: DateTime<Utc>,
}

impl DatabaseSchema {
    /// Builds a schema snapshot, reconciling column key flags.
    pub fn new(mut tables: Vec<TableInfo>, relationships: Vec<RelationshipInfo>) -> Self {
        for table in &mut tables {
            let fk_columns: HashSet<String> = relationships
                .iter()
                .filter(|r| table_name_matches(&r.from_table, &table.name))
                .map(|r| r.from_column.to_lowercase())
                .collect();

            for column in &mut table.columns {
                column.is_primary_key = table
                    .primary_keys
                    .iter()
                    .any(|pk| pk.eq_ignore_ascii_case(&column.name));
                column.is_foreign_key = fk_columns.contains(&column.name.to_lowercase());
            }
        }

        Self {
            tables,
            relationships,
            scanned_at: Utc::now(),
        }
    }

    /// Finds a table by final-segment, case-insensitive name.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| table_name_matches(&t.name, name))
    }

    /// Names of all tables in schema order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(TableInfo::qualified_name).collect()
    }

    /// Total number of columns across all tables.
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Relationships whose endpoints both lie within `tables`.
    pub fn relationships_within<'a>(
        &'a self,
        tables: &'a [TableInfo],
    ) -> impl Iterator<Item = &'a RelationshipInfo> + 'a {
        self.relationships.iter().filter(move |r| {
            tables.iter().any(|t| table_name_matches(&t.name, &r.from_table))
                && tables.iter().any(|t| table_name_matches(&t.name, &r.to_table))
        })
    }

    /// Tables one foreign-key hop away from `table`, in schema order.
    pub fn neighbors_of(&self, table: &str) -> Vec<&TableInfo> {
        self.tables
            .iter()
            .filter(|candidate| !table_name_matches(&candidate.name, table))
            .filter(|candidate| {
                self.relationships.iter().any(|r| {
                    (table_name_matches(&r.from_table, table)
                        && table_name_matches(&r.to_table, &candidate.name))
                        || (table_name_matches(&r.to_table, table)
                            && table_name_matches(&r.from_table, &candidate.name))
                })
            })
            .collect()
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// Kind of schema element a similarity match refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Table,
    Column,
    Relationship,
}

/// One ranked similarity match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMatch {
    pub kind: MatchKind,
    pub table: String,
    pub column: Option<String>,
    pub score: f32,
    pub text: String,
}

/// Relevance-filtered view of a [`DatabaseSchema`] for one question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSchemaContext {
    pub tables: Vec<TableInfo>,
    pub relationships: Vec<RelationshipInfo>,
    pub table_columns: BTreeMap<String, Vec<ColumnInfo>>,
    pub matches: Vec<SchemaMatch>,
}

impl RetrievedSchemaContext {
    /// Builds a context from resolved tables and the relationships among them.
    pub fn from_tables(
        tables: Vec<TableInfo>,
        relationships: Vec<RelationshipInfo>,
        matches: Vec<SchemaMatch>,
    ) -> Self {
        let table_columns = tables
            .iter()
            .map(|t| (t.qualified_name(), t.columns.clone()))
            .collect();

        Self {
            tables,
            relationships,
            table_columns,
            matches,
        }
    }

    /// Context covering every table of `schema`.
    pub fn full(schema: &DatabaseSchema) -> Self {
        Self::from_tables(schema.tables.clone(), schema.relationships.clone(), Vec::new())
    }

    /// `true` when retrieval found no relevant table.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Names of the tables in this context.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(TableInfo::qualified_name).collect()
    }
}

// =============================================================================
// Intent
// =============================================================================

/// Kind of operation a question asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QueryOperation {
    List,
    Count,
    Aggregate,
    Detail,
    Schema,
    Other(String),
}

impl From<String> for QueryOperation {
    fn from(value: String) -> Self {
        match value.trim().to_uppercase().as_str() {
            "LIST" | "SELECT" => Self::List,
            "COUNT" => Self::Count,
            "AGGREGATE" | "SUM" | "AVG" | "AVERAGE" | "MIN" | "MAX" => Self::Aggregate,
            "DETAIL" | "DETAILS" => Self::Detail,
            "SCHEMA" => Self::Schema,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl From<QueryOperation> for String {
    fn from(value: QueryOperation) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => write!(f, "LIST"),
            Self::Count => write!(f, "COUNT"),
            Self::Aggregate => write!(f, "AGGREGATE"),
            Self::Detail => write!(f, "DETAIL"),
            Self::Schema => write!(f, "SCHEMA"),
            Self::Other(other) => write!(f, "{}", other.to_uppercase()),
        }
    }
}

/// A single filter extracted from a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

fn default_operator() -> String {
    "=".to_string()
}

fn default_operation() -> QueryOperation {
    QueryOperation::List
}

/// Structured meaning of a question as extracted by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    #[serde(default = "default_operation", alias = "operationType", alias = "operation_type")]
    pub operation: QueryOperation,
    #[serde(default, alias = "targetEntity", alias = "target_table")]
    pub target_entity: Option<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default, alias = "needsClarification")]
    pub needs_clarification: bool,
    #[serde(default, alias = "clarificationQuestion")]
    pub clarification_question: Option<String>,
}

impl IntentAnalysis {
    /// Creates an intent with no filters or metrics.
    pub fn new(operation: QueryOperation, target_entity: Option<String>) -> Self {
        Self {
            operation,
            target_entity,
            metrics: Vec::new(),
            filters: Vec::new(),
            needs_clarification: false,
            clarification_question: None,
        }
    }

    /// Whether the pipeline has to stop and ask the user.
    pub fn requires_clarification(&self) -> bool {
        self.needs_clarification
    }
}

// =============================================================================
// Execution and responses
// =============================================================================

/// Rows returned by an adapter for one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Outcome of running one SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlExecutionResult {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub error_message: Option<String>,
    pub error_details: Option<SqlError>,
    pub execution_time_ms: u64,
}

impl SqlExecutionResult {
    /// Creates a successful result.
    pub fn succeeded(rows: QueryRows, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            columns: rows.columns,
            rows: rows.rows,
            error_message: None,
            error_details: None,
            execution_time_ms,
        }
    }

    /// Creates a failed result carrying the raw message and its classification.
    pub fn failed(message: impl Into<String>, details: SqlError, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            error_message: Some(message.into()),
            error_details: Some(details),
            execution_time_ms,
        }
    }

    /// Number of returned rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// One self-correction round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    pub attempt_number: u32,
    pub original_sql: String,
    pub error: SqlError,
    pub corrected_sql: Option<String>,
    pub reasoning: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Final answer for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub answer: String,
    pub sql: Option<String>,
    pub execution_result: Option<SqlExecutionResult>,
    pub error_message: Option<String>,
    pub processing_steps: Vec<String>,
    pub correction_history: Vec<CorrectionAttempt>,
    pub was_corrected: bool,
    pub correction_attempts: u32,
}

impl AgentResponse {
    /// Creates a non-success response with the given message.
    pub fn failure(message: impl Into<String>, processing_steps: Vec<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            answer: message.clone(),
            sql: None,
            execution_result: None,
            error_message: Some(message),
            processing_steps,
            correction_history: Vec::new(),
            was_corrected: false,
            correction_attempts: 0,
        }
    }
}
