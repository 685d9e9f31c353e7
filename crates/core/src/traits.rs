use crate::error::StorageError;
use crate::models::{DocumentChunk, DocumentRecord, ExtractedGraph, ScoredChunk};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait VectorIndex {
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), StorageError>;

    async fn upsert_chunks(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StorageError>;

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StorageError>;

    async fn list_documents(&self) -> Result<Vec<String>, StorageError>;

    async fn delete_document(&self, file_name: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait GraphStore {
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<(), StorageError>;

    async fn upsert_graph(
        &self,
        document_id: &str,
        graph: &ExtractedGraph,
    ) -> Result<(), StorageError>;

    /// Runs a read query and returns one JSON object per row, keyed by the
    /// statement's column names.
    async fn run_query(&self, statement: &str, parameters: Value)
        -> Result<Vec<Value>, StorageError>;

    async fn list_documents(&self) -> Result<Vec<String>, StorageError>;

    async fn delete_document(&self, file_name: &str) -> Result<(), StorageError>;
}
