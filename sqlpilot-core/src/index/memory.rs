//! In-process vector index.

use super::{IndexPoint, ScoredPoint, VectorIndex};
use crate::Result;
use crate::embeddings::cosine_similarity;
use crate::error::SqlPilotError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    points: HashMap<String, IndexPoint>,
}

/// Cosine-similarity index held in memory. Contents live as long as the value.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> SqlPilotError {
    SqlPilotError::vector_store(format!("Collection `{}` not found", collection))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        Ok(collections.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                dimensions,
                points: HashMap::new(),
            });
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        collections.remove(collection);
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections
            .get(collection)
            .map(|c| c.points.len() as u64)
            .ok_or_else(|| missing(collection))
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        for point in points {
            if point.vector.len() != target.dimensions {
                return Err(SqlPilotError::vector_store(format!(
                    "Vector has {} dimensions, collection `{}` expects {}",
                    point.vector.len(),
                    collection,
                    target.dimensions
                )));
            }
            target.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        let target = collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;

        let mut results: Vec<ScoredPoint> = target
            .points
            .values()
            .filter_map(|point| {
                let score = cosine_similarity(vector, &point.vector);
                (score >= min_score).then(|| ScoredPoint {
                    id: point.id.clone(),
                    score,
                    payload: point.payload.clone(),
                })
            })
            .collect();

        // Sort by similarity descending, id breaks ties for stable output
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);

        Ok(results)
    }
}
