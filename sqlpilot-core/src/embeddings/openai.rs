//! OpenAI embedding provider.

use super::EmbeddingProvider;
use crate::Result;
use crate::error::SqlPilotError;
use crate::llm::OpenAiClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Known output sizes of OpenAI embedding models.
fn default_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// [`EmbeddingProvider`] backed by the `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Creates an embedder for `model` with its native dimensionality.
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimensions = default_dimensions(&model);
        Self {
            client,
            model,
            dimensions,
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: None,
        };

        let response: EmbeddingResponse = self
            .client
            .request("embeddings", &request)
            .await
            .map_err(|e| SqlPilotError::embedding(e.to_string()))?;

        if response.data.len() != input.len() {
            return Err(SqlPilotError::embedding(format!(
                "Expected {} embeddings but got {}",
                input.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        self.request(&input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SqlPilotError::embedding("No embedding data in response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
