//! OpenAI-compatible embeddings client.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SeedError;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct Embedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl Embedder {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: String,
        model: String,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            dimension,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed one text, checking the vector has the configured dimension
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, SeedError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SeedError::Embedding(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let vector = parse_embedding(&body, self.dimension)?;
        debug!("embedded {} chars into {} dims", text.len(), vector.len());
        Ok(vector)
    }
}

/// Extract the first embedding from a response body
fn parse_embedding(body: &str, dimension: usize) -> Result<Vec<f32>, SeedError> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| SeedError::Embedding(format!("invalid response: {}", e)))?;

    let vector = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| SeedError::Embedding("response contained no embeddings".to_string()))?;

    if vector.len() != dimension {
        return Err(SeedError::Embedding(format!(
            "expected {} dimensions, got {}",
            dimension,
            vector.len()
        )));
    }
    Ok(vector)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
