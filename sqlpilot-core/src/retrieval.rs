//! Retrieval-augmented schema selection.
//!
//! [`SchemaRetriever::retrieve`] embeds the question, searches the schema
//! index and rebuilds a minimal [`RetrievedSchemaContext`] from the full
//! schema: complete column lists for every referenced table plus every
//! relationship among them.

use crate::Result;
use crate::config::RetrievalConfig;
use crate::index::{SchemaIndex, ScoredPoint};
use crate::models::{
    DatabaseSchema, MatchKind, RelationshipInfo, RetrievedSchemaContext, SchemaMatch, TableInfo,
    table_name_matches,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Selects the schema subset relevant to one question.
#[derive(Debug, Clone)]
pub struct SchemaRetriever {
    index: Arc<SchemaIndex>,
    config: RetrievalConfig,
}

/// Referenced table names in first-seen order, capped at `max`.
struct TableSet {
    names: Vec<String>,
    max: usize,
}

impl TableSet {
    fn new(max: usize) -> Self {
        Self {
            names: Vec::new(),
            max,
        }
    }

    fn insert(&mut self, name: &str) {
        if self.names.iter().any(|n| table_name_matches(n, name)) {
            return;
        }
        if self.names.len() < self.max {
            self.names.push(name.to_string());
        }
    }
}

impl SchemaRetriever {
    /// Creates a retriever over `index`.
    pub fn new(index: Arc<SchemaIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    /// Retrieves the context for `question` from `collection`.
    ///
    /// Returns an empty context when nothing scores above `min_score`; the
    /// caller treats that as a retrieval miss.
    ///
    /// # Errors
    /// Returns an error when embedding or search keeps failing.
    pub async fn retrieve(
        &self,
        question: &str,
        schema: &DatabaseSchema,
        collection: &str,
    ) -> Result<RetrievedSchemaContext> {
        let vector = self.index.embed_question(question).await?;
        let hits = self
            .index
            .search(collection, &vector, self.config.top_k, self.config.min_score)
            .await?;

        let context = assemble_context(&hits, schema, self.config.max_tables);
        tracing::debug!(
            hits = hits.len(),
            table_count = context.tables.len(),
            relationship_count = context.relationships.len(),
            "Retrieved schema context"
        );
        Ok(context)
    }
}

/// Rebuilds a context from ranked search hits against the full schema.
pub fn assemble_context(
    hits: &[ScoredPoint],
    schema: &DatabaseSchema,
    max_tables: usize,
) -> RetrievedSchemaContext {
    let mut tables = TableSet::new(max_tables);
    let mut direct_relationships: Vec<RelationshipInfo> = Vec::new();
    let mut matches = Vec::with_capacity(hits.len());

    for hit in hits {
        let payload = &hit.payload;
        match payload.kind {
            MatchKind::Table | MatchKind::Column => tables.insert(&payload.table),
            MatchKind::Relationship => {
                if let Some(relationship) = &payload.relationship {
                    tables.insert(&relationship.from_table);
                    tables.insert(&relationship.to_table);
                    direct_relationships.push(relationship.clone());
                } else {
                    tables.insert(&payload.table);
                }
            }
        }

        matches.push(SchemaMatch {
            kind: payload.kind,
            table: payload.table.clone(),
            column: payload.column.clone(),
            score: hit.score,
            text: payload.text.clone(),
        });
    }

    let resolved: Vec<TableInfo> = tables
        .names
        .iter()
        .filter_map(|name| schema.table(name).cloned())
        .collect();

    if resolved.is_empty() {
        return RetrievedSchemaContext::default();
    }

    let described = |table: &str| resolved.iter().any(|t| table_name_matches(&t.name, table));
    let mut seen: HashSet<RelationshipInfo> = HashSet::new();
    let relationships: Vec<RelationshipInfo> = schema
        .relationships_within(&resolved)
        .cloned()
        .chain(
            direct_relationships
                .into_iter()
                .filter(|r| described(&r.from_table) && described(&r.to_table)),
        )
        .filter(|r| seen.insert(r.clone()))
        .collect();

    RetrievedSchemaContext::from_tables(resolved, relationships, matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SchemaPayload;
    use crate::models::ColumnInfo;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            vec![
                TableInfo::new("Customers", Some("sales".to_string()))
                    .with_columns(vec![ColumnInfo::new("Id", "int"), ColumnInfo::new("Name", "nvarchar")]),
                TableInfo::new("Orders", Some("sales".to_string()))
                    .with_columns(vec![ColumnInfo::new("Id", "int"), ColumnInfo::new("CustomerId", "int")]),
                TableInfo::new("Products", Some("sales".to_string()))
                    .with_columns(vec![ColumnInfo::new("Id", "int")]),
            ],
            vec![RelationshipInfo::new("Orders", "CustomerId", "Customers", "Id")],
        )
    }

    fn hit(kind: MatchKind, table: &str, column: Option<&str>, score: f32) -> ScoredPoint {
        ScoredPoint {
            id: format!("{}-{:?}", table, column),
            score,
            payload: SchemaPayload {
                kind,
                table: table.to_string(),
                column: column.map(str::to_string),
                relationship: None,
                text: table.to_string(),
            },
        }
    }

    #[test]
    fn test_column_hit_pulls_full_table() {
        let hits = vec![hit(MatchKind::Column, "sales.Customers", Some("Name"), 0.9)];
        let context = assemble_context(&hits, &schema(), 10);

        assert_eq!(context.table_names(), vec!["sales.Customers".to_string()]);
        assert_eq!(context.tables[0].columns.len(), 2);
        assert_eq!(context.matches.len(), 1);
        assert!(context.relationships.is_empty());
    }

    #[test]
    fn test_relationships_between_resolved_tables_are_included_once() {
        let mut relationship_hit = hit(MatchKind::Relationship, "Orders", Some("CustomerId"), 0.7);
        relationship_hit.payload.relationship =
            Some(RelationshipInfo::new("Orders", "CustomerId", "Customers", "Id"));

        let hits = vec![
            hit(MatchKind::Table, "Customers", None, 0.9),
            hit(MatchKind::Table, "dbo.Orders", None, 0.8),
            relationship_hit,
        ];
        let context = assemble_context(&hits, &schema(), 10);

        assert_eq!(context.tables.len(), 2);
        assert_eq!(context.relationships.len(), 1);
    }

    #[test]
    fn test_relationship_to_capped_table_is_dropped() {
        let mut relationship_hit = hit(MatchKind::Relationship, "Orders", Some("CustomerId"), 0.7);
        relationship_hit.payload.relationship =
            Some(RelationshipInfo::new("Orders", "CustomerId", "Customers", "Id"));

        // Products fills the second slot before the relationship names Customers
        let hits = vec![
            hit(MatchKind::Table, "Orders", None, 0.9),
            hit(MatchKind::Table, "Products", None, 0.8),
            relationship_hit,
        ];
        let context = assemble_context(&hits, &schema(), 2);

        assert_eq!(
            context.table_names(),
            vec!["sales.Orders".to_string(), "sales.Products".to_string()]
        );
        assert!(context.relationships.is_empty());
    }

    #[test]
    fn test_table_cap_and_unknown_tables() {
        let hits = vec![
            hit(MatchKind::Table, "Customers", None, 0.9),
            hit(MatchKind::Table, "Orders", None, 0.8),
            hit(MatchKind::Table, "Products", None, 0.7),
        ];
        let context = assemble_context(&hits, &schema(), 2);
        assert_eq!(context.tables.len(), 2);

        let hits = vec![hit(MatchKind::Table, "Ghost", None, 0.9)];
        assert!(assemble_context(&hits, &schema(), 10).is_empty());
        assert!(assemble_context(&[], &schema(), 10).is_empty());
    }
}
