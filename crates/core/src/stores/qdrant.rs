use crate::models::{DocumentChunk, ScoredChunk};
use crate::traits::VectorIndex;
use crate::StorageError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SCROLL_PAGE_SIZE: usize = 100;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    api_key: Option<String>,
    vector_size: usize,
    client: Client,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            api_key,
            vector_size,
            client: Client::new(),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(REQUEST_TIMEOUT);
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    /// Deterministic point identity derived from the chunk ID, so retried
    /// or overlapping ingestions converge on the same point.
    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), StorageError> {
        if self.vector_size != dimensions {
            return Err(StorageError::Request(format!(
                "configured vector size {} does not match requested {}",
                self.vector_size, dimensions
            )));
        }

        let response = self
            .prepare(self.client.get(self.collection_url("")))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(StorageError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .prepare(self.client.put(self.collection_url("")))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn upsert_chunks(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StorageError> {
        if chunks.len() != embeddings.len() {
            return Err(StorageError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(StorageError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": Self::point_id(&chunk.chunk_id),
                    "vector": embedding,
                    "payload": {
                        "chunk_id": chunk.chunk_id,
                        "document_id": chunk.document_id,
                        "file_name": chunk.file_name,
                        "chunk_index": chunk.chunk_index,
                        "text": chunk.text,
                    },
                }))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .prepare(self.client.put(self.collection_url("/points?wait=true")))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StorageError> {
        if query_vector.len() != self.vector_size {
            return Err(StorageError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .prepare(self.client.post(self.collection_url("/points/search")))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(chunks_from_search(&parsed))
    }

    async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
        let mut names = BTreeSet::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE_SIZE,
                "with_payload": true,
            });
            if let Some(offset_value) = &offset {
                body["offset"] = offset_value.clone();
            }

            let response = self
                .prepare(self.client.post(self.collection_url("/points/scroll")))
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(StorageError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: response.status().to_string(),
                });
            }

            let parsed: Value = response.json().await?;
            for point in parsed
                .pointer("/result/points")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(file_name) = point
                    .pointer("/payload/file_name")
                    .and_then(Value::as_str)
                {
                    names.insert(file_name.to_string());
                }
            }

            match parsed.pointer("/result/next_page_offset") {
                Some(next) if !next.is_null() => offset = Some(next.clone()),
                _ => break,
            }
        }

        Ok(names.into_iter().collect())
    }

    async fn delete_document(&self, file_name: &str) -> Result<(), StorageError> {
        let response = self
            .prepare(
                self.client
                    .post(self.collection_url("/points/delete?wait=true")),
            )
            .json(&json!({
                "filter": {
                    "must": [
                        { "key": "file_name", "match": { "value": file_name } }
                    ]
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

fn chunks_from_search(payload: &Value) -> Vec<ScoredChunk> {
    let hits = payload
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::new();
    for hit in hits {
        let chunk_id = hit
            .pointer("/payload/chunk_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let file_name = hit
            .pointer("/payload/file_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let text = hit
            .pointer("/payload/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

        result.push(ScoredChunk {
            chunk_id,
            file_name,
            text,
            score,
        });
    }

    result
}
