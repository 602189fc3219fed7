//! Minimal Qdrant REST client: collection lifecycle, upsert and search.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::SeedError;

#[derive(Debug, Serialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub points_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ScoredPoint {
    /// Point id as text; Qdrant ids are either UUID strings or integers
    pub fn id_text(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

pub struct QdrantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Collection metadata, `None` when the collection does not exist
    pub async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, SeedError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", name))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: Envelope<CollectionInfo> = check(response).await?.json().await?;
        Ok(Some(info.result))
    }

    pub async fn create_collection(&self, name: &str, size: usize) -> Result<(), SeedError> {
        let body = json!({ "vectors": { "size": size, "distance": "Cosine" } });
        let response = self
            .request(Method::PUT, &format!("collections/{}", name))
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), SeedError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{}", name))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Make sure the collection exists, dropping it first when `recreate` is set
    pub async fn ensure_collection(
        &self,
        name: &str,
        size: usize,
        recreate: bool,
    ) -> Result<(), SeedError> {
        let existing = self.collection_info(name).await?;

        if existing.is_some() && recreate {
            self.delete_collection(name).await?;
            info!("Deleted collection {}", name);
        } else if let Some(info) = existing {
            info!(
                "Collection {} exists ({} points)",
                name,
                info.points_count.unwrap_or(0)
            );
            return Ok(());
        }

        self.create_collection(name, size).await?;
        info!("Created collection {} (size {}, cosine)", name, size);
        Ok(())
    }

    pub async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), SeedError> {
        let body = json!({ "points": points });
        let response = self
            .request(Method::PUT, &format!("collections/{}/points?wait=true", name))
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, SeedError> {
        let body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        let response = self
            .request(Method::POST, &format!("collections/{}/points/search", name))
            .json(&body)
            .send()
            .await?;
        let found: Envelope<Vec<ScoredPoint>> = check(response).await?.json().await?;
        Ok(found.result)
    }
}

/// Turn a non-2xx response into a `SeedError::Qdrant` carrying the body
async fn check(response: reqwest::Response) -> Result<reqwest::Response, SeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SeedError::Qdrant(format!(
        "HTTP {}: {}",
        status,
        body.chars().take(200).collect::<String>()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_serialization() {
        let id = Uuid::from_bytes([7u8; 16]);
        let point = Point {
            id,
            vector: vec![0.5, 0.25],
            payload: json!({ "type": "ddl" }),
        };
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(value["id"], json!(id.to_string()));
        assert_eq!(value["vector"], json!([0.5, 0.25]));
        assert_eq!(value["payload"]["type"], "ddl");
    }

    #[test]
    fn test_collection_info_parsing() {
        let body = r#"{"result":{"status":"green","points_count":29,"config":{}},"status":"ok","time":0.001}"#;
        let info: Envelope<CollectionInfo> = serde_json::from_str(body).unwrap();
        assert_eq!(info.result.points_count, Some(29));
        assert_eq!(info.result.status.as_deref(), Some("green"));
    }

    #[test]
    fn test_search_result_parsing() {
        let body = r#"{"result":[
            {"id":"0a0b0c0d-0000-0000-0000-000000000000","version":1,"score":0.83,"payload":{"type":"documentation","title":"Perfect Orders"}},
            {"id":42,"version":1,"score":0.41}
        ],"status":"ok"}"#;
        let found: Envelope<Vec<ScoredPoint>> = serde_json::from_str(body).unwrap();
        assert_eq!(found.result.len(), 2);
        assert!((found.result[0].score - 0.83).abs() < 1e-6);
        assert_eq!(
            found.result[0].payload.as_ref().unwrap()["title"],
            "Perfect Orders"
        );
        assert_eq!(found.result[1].id, json!(42));
        assert_eq!(found.result[0].id_text(), "0a0b0c0d-0000-0000-0000-000000000000");
        assert_eq!(found.result[1].id_text(), "42");
        assert!(found.result[1].payload.is_none());
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = QdrantClient::new(reqwest::Client::new(), "http://localhost:6333/", None);
        assert_eq!(client.base_url, "http://localhost:6333");
    }
}
