//! Qdrant vector index over the REST API.

use super::{IndexPoint, SchemaPayload, ScoredPoint, VectorIndex};
use crate::Result;
use crate::error::SqlPilotError;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use zeroize::Zeroizing;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Serialize)]
struct PointStruct<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: &'a SchemaPayload,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Debug, Deserialize)]
struct ScoredPointWire {
    id: serde_json::Value,
    score: f32,
    payload: Option<SchemaPayload>,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    status: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// ============================================================================
// CLIENT
// ============================================================================

/// [`VectorIndex`] stored in a Qdrant instance.
#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl QdrantIndex {
    /// Creates a client for the Qdrant instance at `base_url`.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: Option<Zeroizing<String>>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                SqlPilotError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key.as_str());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SqlPilotError::vector_store(format!("Qdrant request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorStatus>(&text)
            .map(|e| e.status.error)
            .unwrap_or(text);

        let message = if status == StatusCode::NOT_FOUND {
            format!("Qdrant collection not found: {}", detail)
        } else {
            format!("Qdrant returned HTTP {}: {}", status.as_u16(), detail)
        };
        Err(SqlPilotError::vector_store(message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let response = self.send(method, path, body).await?;
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            SqlPilotError::vector_store(format!("Failed to parse Qdrant response: {}", e))
        })?;
        Ok(envelope.result)
    }
}

fn point_id(id: serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let result: ExistsResult = self
            .send_json(Method::GET, &format!("collections/{}/exists", collection), None)
            .await?;
        Ok(result.exists)
    }

    async fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        tracing::info!(collection, dimensions, "Creating Qdrant collection");
        self.send(
            Method::PUT,
            &format!("collections/{}", collection),
            Some(json!({ "vectors": { "size": dimensions, "distance": "Cosine" } })),
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("collections/{}", collection), None)
            .await?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let result: CountResult = self
            .send_json(
                Method::POST,
                &format!("collections/{}/points/count", collection),
                Some(json!({ "exact": true })),
            )
            .await?;
        Ok(result.count)
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let request = UpsertRequest {
            points: points
                .iter()
                .map(|p| PointStruct {
                    id: &p.id,
                    vector: &p.vector,
                    payload: &p.payload,
                })
                .collect(),
        };
        let body = serde_json::to_value(&request).map_err(|e| {
            SqlPilotError::Serialization {
                context: "Failed to encode Qdrant points".to_string(),
                source: e,
            }
        })?;

        self.send(
            Method::PUT,
            &format!("collections/{}/points?wait=true", collection),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let hits: Vec<ScoredPointWire> = self
            .send_json(
                Method::POST,
                &format!("collections/{}/points/search", collection),
                Some(json!({
                    "vector": vector,
                    "limit": limit,
                    "score_threshold": min_score,
                    "with_payload": true,
                })),
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                hit.payload.map(|payload| ScoredPoint {
                    id: point_id(hit.id),
                    score: hit.score,
                    payload,
                })
            })
            .collect())
    }
}
