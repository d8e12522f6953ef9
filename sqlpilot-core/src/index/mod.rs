//! Vector index capability and the schema index built on it.
//!
//! # Module Structure
//! - `memory`: Process-local cosine-similarity index
//! - `qdrant`: Qdrant REST client
//! - `schema_index`: Schema documents, embedding and lazy population
//!
//! A collection holding zero points is treated exactly like a collection
//! that does not exist yet: both mean "not indexed".

mod memory;
mod qdrant;
mod schema_index;

use crate::Result;
use crate::models::{MatchKind, RelationshipInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantIndex;
pub use schema_index::{SchemaIndex, collection_name, schema_documents};

/// Payload stored next to every schema embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaPayload {
    pub kind: MatchKind,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipInfo>,
    pub text: String,
}

/// A vector with its payload, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: SchemaPayload,
}

impl IndexPoint {
    /// Creates a point with a fresh random id.
    pub fn new(vector: Vec<f32>, payload: SchemaPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            payload,
        }
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: SchemaPayload,
}

/// Collection-oriented vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether `collection` exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Creates `collection` for vectors of `dimensions` using cosine distance.
    async fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()>;

    /// Drops `collection` and every point in it.
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Number of points in `collection`.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Inserts or replaces points.
    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<()>;

    /// Up to `limit` points scoring at least `min_score`, best first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredPoint>>;
}
