//! Schema documents embedded into a vector index.
//!
//! One document is produced per table, per column and per relationship.
//! Documents are plain sentences so that a question embedding lands close to
//! the tables and columns it talks about.

use super::{IndexPoint, SchemaPayload, ScoredPoint, VectorIndex};
use crate::Result;
use crate::embeddings::EmbeddingProvider;
use crate::models::{DatabaseSchema, MatchKind};
use crate::resilience::VectorStoreHandler;
use std::sync::Arc;

/// Texts embedded per request.
const EMBEDDING_BATCH_SIZE: usize = 64;

/// Collection name for a logical namespace: lowercase, `[a-z0-9_]` only.
///
/// # Example
/// ```rust
/// use sqlpilot_core::index::collection_name;
///
/// assert_eq!(collection_name("Northwind"), "sqlpilot_northwind");
/// assert_eq!(collection_name("my-db.v2"), "sqlpilot_my_db_v2");
/// ```
pub fn collection_name(namespace: &str) -> String {
    let sanitized: String = namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("sqlpilot_{}", sanitized)
}

/// Builds the documents indexed for `schema`.
pub fn schema_documents(schema: &DatabaseSchema) -> Vec<SchemaPayload> {
    let mut documents = Vec::with_capacity(
        schema.tables.len() + schema.column_count() + schema.relationships.len(),
    );

    for table in &schema.tables {
        let table_name = table.qualified_name();
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let mut text = format!("{} ({}", c.name, c.data_type);
                if c.is_primary_key {
                    text.push_str(", primary key");
                }
                if c.is_foreign_key {
                    text.push_str(", foreign key");
                }
                text.push(')');
                text
            })
            .collect();

        documents.push(SchemaPayload {
            kind: MatchKind::Table,
            table: table_name.clone(),
            column: None,
            relationship: None,
            text: format!("Table {} with columns {}", table_name, columns.join(", ")),
        });

        for column in &table.columns {
            documents.push(SchemaPayload {
                kind: MatchKind::Column,
                table: table_name.clone(),
                column: Some(column.name.clone()),
                relationship: None,
                text: format!(
                    "Column {} of table {}, type {}{}",
                    column.name,
                    table_name,
                    column.data_type,
                    if column.is_nullable { ", nullable" } else { "" }
                ),
            });
        }
    }

    for relationship in &schema.relationships {
        documents.push(SchemaPayload {
            kind: MatchKind::Relationship,
            table: relationship.from_table.clone(),
            column: Some(relationship.from_column.clone()),
            relationship: Some(relationship.clone()),
            text: format!(
                "{}.{} references {}.{}",
                relationship.from_table,
                relationship.from_column,
                relationship.to_table,
                relationship.to_column
            ),
        });
    }

    documents
}

/// Schema embeddings stored in a [`VectorIndex`].
pub struct SchemaIndex {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    handler: VectorStoreHandler,
}

impl std::fmt::Debug for SchemaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaIndex")
            .field("dimensions", &self.embedder.dimensions())
            .finish_non_exhaustive()
    }
}

impl SchemaIndex {
    /// Creates a schema index over the given store and embedder.
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            handler: VectorStoreHandler::new(),
        }
    }

    /// Makes sure `collection` exists and holds the schema's documents.
    ///
    /// An existing collection with zero points is populated like a new one.
    /// Returns the number of points in the collection afterwards.
    ///
    /// # Errors
    /// Returns an error when the store or the embedder keeps failing.
    pub async fn ensure_indexed(&self, collection: &str, schema: &DatabaseSchema) -> Result<u64> {
        let exists = self
            .handler
            .call(|| self.index.collection_exists(collection))
            .await?;

        if !exists {
            let dimensions = self.embedder.dimensions();
            self.handler
                .call(|| self.index.create_collection(collection, dimensions))
                .await?;
        }

        let count = self.handler.call(|| self.index.count(collection)).await?;
        if count > 0 {
            tracing::debug!(collection, points = count, "Schema index already populated");
            return Ok(count);
        }

        self.populate(collection, schema).await
    }

    /// Drops `collection` and indexes `schema` from scratch.
    ///
    /// # Errors
    /// Returns an error when the store or the embedder keeps failing.
    pub async fn rebuild(&self, collection: &str, schema: &DatabaseSchema) -> Result<u64> {
        let exists = self
            .handler
            .call(|| self.index.collection_exists(collection))
            .await?;
        if exists {
            self.handler
                .call(|| self.index.delete_collection(collection))
                .await?;
        }

        let dimensions = self.embedder.dimensions();
        self.handler
            .call(|| self.index.create_collection(collection, dimensions))
            .await?;
        self.populate(collection, schema).await
    }

    async fn populate(&self, collection: &str, schema: &DatabaseSchema) -> Result<u64> {
        let start_time = std::time::Instant::now();
        let documents = schema_documents(schema);
        let mut indexed = 0u64;

        for chunk in documents.chunks(EMBEDDING_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|d| d.text.clone()).collect();
            let vectors = self
                .handler
                .call(|| self.embedder.embed_batch(&texts))
                .await?;

            let points: Vec<IndexPoint> = vectors
                .into_iter()
                .zip(chunk.iter().cloned())
                .map(|(vector, payload)| IndexPoint::new(vector, payload))
                .collect();
            let batch_len = points.len() as u64;

            // upsert takes ownership, so every attempt gets its own copy
            self.handler
                .call(|| self.index.upsert(collection, points.clone()))
                .await?;
            indexed += batch_len;
        }

        tracing::info!(
            collection,
            points = indexed,
            table_count = schema.tables.len(),
            "Indexed schema in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(indexed)
    }

    /// Embeds a question.
    ///
    /// # Errors
    /// Returns an error when the embedder keeps failing.
    pub async fn embed_question(&self, question: &str) -> Result<Vec<f32>> {
        Ok(self.handler.call(|| self.embedder.embed(question)).await?)
    }

    /// Similarity search over `collection`.
    ///
    /// # Errors
    /// Returns an error when the store keeps failing.
    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredPoint>> {
        Ok(self
            .handler
            .call(|| self.index.search(collection, vector, limit, min_score))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryVectorIndex;
    use crate::models::{ColumnInfo, RelationshipInfo, TableInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Embeds texts as keyword-presence vectors.
    struct KeywordEmbedder {
        batches: AtomicU32,
    }

    const KEYWORDS: [&str; 4] = ["customer", "order", "name", "references"];

    fn keyword_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        KEYWORDS
            .iter()
            .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
            .collect()
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(keyword_vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }

        fn dimensions(&self) -> usize {
            KEYWORDS.len()
        }
    }

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            vec![
                TableInfo::new("Customers", None)
                    .with_columns(vec![
                        ColumnInfo::new("Id", "INTEGER"),
                        ColumnInfo::new("Name", "TEXT"),
                    ])
                    .with_primary_keys(vec!["Id".to_string()]),
                TableInfo::new("Orders", None).with_columns(vec![
                    ColumnInfo::new("Id", "INTEGER"),
                    ColumnInfo::new("CustomerId", "INTEGER"),
                ]),
            ],
            vec![RelationshipInfo::new("Orders", "CustomerId", "Customers", "Id")],
        )
    }

    #[test]
    fn test_documents_cover_tables_columns_and_relationships() {
        let documents = schema_documents(&schema());
        assert_eq!(documents.len(), 2 + 4 + 1);

        let table_doc = &documents[0];
        assert_eq!(table_doc.kind, MatchKind::Table);
        assert!(table_doc.text.contains("Id (INTEGER, primary key)"));

        let relationship = documents
            .iter()
            .find(|d| d.kind == MatchKind::Relationship)
            .expect("relationship document");
        assert_eq!(relationship.text, "Orders.CustomerId references Customers.Id");
    }

    #[tokio::test]
    async fn test_ensure_indexed_populates_once() {
        let embedder = Arc::new(KeywordEmbedder {
            batches: AtomicU32::new(0),
        });
        let store = Arc::new(InMemoryVectorIndex::new());
        let index = SchemaIndex::new(store.clone(), embedder.clone());

        let count = index.ensure_indexed("sqlpilot_shop", &schema()).await.expect("indexed");
        assert_eq!(count, 7);

        let count = index.ensure_indexed("sqlpilot_shop", &schema()).await.expect("indexed");
        assert_eq!(count, 7);
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 1);

        // An emptied collection counts as not indexed
        store.delete_collection("sqlpilot_shop").await.expect("deleted");
        store.create_collection("sqlpilot_shop", 4).await.expect("created");
        index.ensure_indexed("sqlpilot_shop", &schema()).await.expect("indexed");
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_search_finds_matching_table() {
        let embedder = Arc::new(KeywordEmbedder {
            batches: AtomicU32::new(0),
        });
        let index = SchemaIndex::new(Arc::new(InMemoryVectorIndex::new()), embedder);
        index.rebuild("sqlpilot_shop", &schema()).await.expect("rebuilt");

        let vector = index.embed_question("list every order").await.expect("embedded");
        let hits = index.search("sqlpilot_shop", &vector, 5, 0.5).await.expect("search");
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.payload.text.to_lowercase().contains("order")));
    }
}
