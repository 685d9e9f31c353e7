use crate::chunking::build_chunks;
use crate::completion::ChatModel;
use crate::embeddings::Embedder;
use crate::error::{IngestError, QueryError, StorageError};
use crate::extractor::extract_document_text;
use crate::graph::GraphProcessor;
use crate::models::{
    BranchOutcome, ChunkingOptions, DocumentRecord, ModeAnswer, QueryComparison, RetrievalMode,
};
use crate::traits::{GraphStore, VectorIndex};
use crate::vector::VectorProcessor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::timeout;

const HYBRID_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions based on combined vector and graph data.";
const HYBRID_MAX_TOKENS: u32 = 100;
const BOTH_BRANCHES_DOWN: &str = "both retrieval branches were unavailable";

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub chunking: ChunkingOptions,
    pub top_k: usize,
    pub branch_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            top_k: 5,
            branch_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub file_name: String,
    pub document_id: String,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub skipped_extraction_windows: usize,
}

/// Owns both retrieval pipelines and runs them side by side: every query
/// produces a vector answer, a graph answer, and a hybrid synthesis of
/// the two evidence sets.
pub struct HybridCoordinator<E, V, G, C> {
    vector: VectorProcessor<E, V, C>,
    graph: GraphProcessor<G, C>,
    model: C,
    options: CoordinatorOptions,
}

impl<E, V, G, C> HybridCoordinator<E, V, G, C>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
    G: GraphStore + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub fn new(
        vector: VectorProcessor<E, V, C>,
        graph: GraphProcessor<G, C>,
        model: C,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            vector,
            graph,
            model,
            options,
        }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        self.vector.init().await?;
        self.graph.init().await?;
        Ok(())
    }

    pub async fn ingest_document(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestionSummary, IngestError> {
        let text = extract_document_text(bytes)?;
        let document = DocumentRecord::new(file_name, bytes, text);
        let chunks = build_chunks(&document, &self.options.chunking)?;

        let chunk_count = self.vector.ingest(&chunks).await?;
        let report = self.graph.ingest(&document).await?;

        Ok(IngestionSummary {
            file_name: document.file_name,
            document_id: document.document_id,
            chunk_count,
            entity_count: report.entity_count,
            relationship_count: report.relationship_count,
            skipped_extraction_windows: report.skipped_windows.len(),
        })
    }

    /// Runs the vector and graph branches concurrently, each under its own
    /// timeout. A failed branch is reported as unavailable instead of
    /// taking the whole comparison down with it.
    pub async fn compare(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<QueryComparison, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let top_k = top_k.unwrap_or(self.options.top_k);

        let (vector_result, graph_result) = tokio::join!(
            timeout(self.options.branch_timeout, self.vector.query(question, top_k)),
            timeout(self.options.branch_timeout, self.graph.query(question)),
        );

        let vector = branch_outcome(vector_result);
        let graph = branch_outcome(graph_result);
        let hybrid = self.synthesize(question, &vector, &graph).await;

        Ok(QueryComparison {
            question: question.to_string(),
            vector,
            graph,
            hybrid,
        })
    }

    async fn synthesize(
        &self,
        question: &str,
        vector: &BranchOutcome,
        graph: &BranchOutcome,
    ) -> BranchOutcome {
        if !vector.is_answered() && !graph.is_answered() {
            return BranchOutcome::Unavailable {
                reason: BOTH_BRANCHES_DOWN.to_string(),
            };
        }

        let context = format!(
            "Vector DB Context:\n{}\n\nGraph DB Context:\n{}",
            branch_context(vector),
            branch_context(graph)
        );

        let evidence: Vec<String> = vector
            .evidence()
            .iter()
            .chain(graph.evidence().iter())
            .cloned()
            .collect();

        match self
            .model
            .complete(
                HYBRID_SYSTEM_PROMPT,
                &hybrid_prompt(question, &context),
                HYBRID_MAX_TOKENS,
            )
            .await
        {
            Ok(answer) => BranchOutcome::Answered(ModeAnswer {
                mode: RetrievalMode::Hybrid,
                answer,
                evidence,
            }),
            Err(error) => BranchOutcome::Unavailable {
                reason: error.to_string(),
            },
        }
    }

    /// Documents present in both stores; a half-ingested document shows up
    /// in neither list.
    pub async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
        let vector_names: BTreeSet<String> =
            self.vector.list_documents().await?.into_iter().collect();
        let graph_names: BTreeSet<String> =
            self.graph.list_documents().await?.into_iter().collect();

        Ok(vector_names.intersection(&graph_names).cloned().collect())
    }

    pub async fn delete_document(&self, file_name: &str) -> Result<(), StorageError> {
        self.vector.delete_document(file_name).await?;
        self.graph.delete_document(file_name).await?;
        Ok(())
    }
}

fn branch_outcome(
    result: Result<Result<ModeAnswer, QueryError>, tokio::time::error::Elapsed>,
) -> BranchOutcome {
    match result {
        Ok(Ok(answer)) => BranchOutcome::Answered(answer),
        Ok(Err(error)) => BranchOutcome::Unavailable {
            reason: error.to_string(),
        },
        Err(_) => BranchOutcome::Unavailable {
            reason: "retrieval timed out".to_string(),
        },
    }
}

fn branch_context(outcome: &BranchOutcome) -> String {
    match outcome {
        BranchOutcome::Answered(answer) => answer.answer.clone(),
        BranchOutcome::Unavailable { reason } => format!("(unavailable: {reason})"),
    }
}

fn hybrid_prompt(question: &str, context: &str) -> String {
    format!(
        "Based on the combined context from vector and graph databases, provide a \
         concise, accurate answer to the question. Prioritize information that \
         appears in both sources for reliability. A source marked unavailable \
         contributed nothing; answer from the remaining one.\n\n\
         Question: {question}\n\
         Combined Context: {context}\n\n\
         Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompletionError, EmbeddingError};
    use crate::models::{DocumentChunk, ExtractedGraph, ScoredChunk};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0; 4])
        }
    }

    struct FakeIndex {
        hits: Vec<ScoredChunk>,
        fail_search: bool,
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn ensure_collection(&self, _dimensions: usize) -> Result<(), StorageError> {
            Ok(())
        }

        async fn upsert_chunks(
            &self,
            _chunks: &[DocumentChunk],
            _embeddings: &[Vec<f32>],
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<ScoredChunk>, StorageError> {
            if self.fail_search {
                return Err(StorageError::Request("vector store is down".to_string()));
            }
            Ok(self.hits.clone())
        }

        async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
            Ok(vec!["report.pdf".to_string(), "other.pdf".to_string()])
        }

        async fn delete_document(&self, _file_name: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    struct FakeGraph {
        rows: Vec<Value>,
    }

    #[async_trait]
    impl GraphStore for FakeGraph {
        async fn ensure_schema(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn upsert_document(&self, _document: &DocumentRecord) -> Result<(), StorageError> {
            Ok(())
        }

        async fn upsert_graph(
            &self,
            _document_id: &str,
            _graph: &ExtractedGraph,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn run_query(
            &self,
            _statement: &str,
            _parameters: Value,
        ) -> Result<Vec<Value>, StorageError> {
            Ok(self.rows.clone())
        }

        async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
            Ok(vec!["report.pdf".to_string()])
        }

        async fn delete_document(&self, _file_name: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    /// Echoes the user prompt back so assertions can see what context the
    /// synthesis call received.
    struct EchoModel {
        calls: Mutex<Vec<String>>,
    }

    impl EchoModel {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _max_tokens: u32,
        ) -> Result<String, CompletionError> {
            self.calls.lock().expect("lock").push(user.to_string());
            if user.contains("Cypher") {
                return Ok(
                    "MATCH (e:Entity)-[r:RELATED]->(t:Entity {name: 'Acme Corp'}) \
                     RETURN e.name AS entityName"
                        .to_string(),
                );
            }
            Ok(format!("Answer derived from: {user}"))
        }
    }

    fn sentence_hit() -> ScoredChunk {
        ScoredChunk {
            chunk_id: "chunk-1".to_string(),
            file_name: "report.pdf".to_string(),
            text: "Alice works for Acme Corp.".to_string(),
            score: 0.9,
        }
    }

    fn coordinator(
        fail_vector: bool,
        graph_rows: Vec<Value>,
    ) -> HybridCoordinator<FakeEmbedder, FakeIndex, FakeGraph, EchoModel> {
        let vector = VectorProcessor::new(
            FakeEmbedder,
            FakeIndex {
                hits: vec![sentence_hit()],
                fail_search: fail_vector,
            },
            EchoModel::new(),
        );
        let graph = GraphProcessor::new(FakeGraph { rows: graph_rows }, EchoModel::new());
        HybridCoordinator::new(vector, graph, EchoModel::new(), CoordinatorOptions::default())
    }

    #[tokio::test]
    async fn all_three_answers_come_back_together() {
        let coordinator = coordinator(false, vec![json!({ "entityName": "Alice" })]);

        let comparison = coordinator
            .compare("Who works for Acme Corp?", None)
            .await
            .expect("comparison should succeed");

        assert!(comparison.vector.is_answered());
        assert!(comparison.graph.is_answered());
        assert!(comparison.hybrid.is_answered());

        // The graph branch surfaced Alice and the vector branch the source
        // sentence; the hybrid evidence carries both.
        assert!(comparison
            .graph
            .evidence()
            .iter()
            .any(|record| record.contains("Alice")));
        assert!(comparison
            .vector
            .evidence()
            .iter()
            .any(|snippet| snippet.contains("Alice works for Acme Corp.")));
        if let BranchOutcome::Answered(hybrid) = &comparison.hybrid {
            assert!(hybrid.answer.contains("Alice"));
            assert!(!hybrid.evidence.is_empty());
        }
    }

    #[tokio::test]
    async fn failed_vector_branch_is_marked_unavailable_not_fatal() {
        let coordinator = coordinator(true, vec![json!({ "entityName": "Alice" })]);

        let comparison = coordinator
            .compare("Who works for Acme Corp?", None)
            .await
            .expect("comparison should succeed");

        assert!(!comparison.vector.is_answered());
        assert!(comparison.graph.is_answered());

        let hybrid = match &comparison.hybrid {
            BranchOutcome::Answered(answer) => answer,
            BranchOutcome::Unavailable { reason } => panic!("hybrid unavailable: {reason}"),
        };
        assert!(!hybrid.answer.is_empty());

        if let BranchOutcome::Unavailable { reason } = &comparison.vector {
            assert!(reason.contains("vector store is down"));
        }
    }

    #[tokio::test]
    async fn both_branches_down_yields_an_unavailable_hybrid_without_synthesis() {
        // A graph store returning no rows still produces a no-match answer,
        // which counts as answered; both stores must actually fail here.
        let vector = VectorProcessor::new(
            FakeEmbedder,
            FakeIndex {
                hits: Vec::new(),
                fail_search: true,
            },
            EchoModel::new(),
        );
        struct DownGraph;
        #[async_trait]
        impl GraphStore for DownGraph {
            async fn ensure_schema(&self) -> Result<(), StorageError> {
                Ok(())
            }
            async fn upsert_document(
                &self,
                _document: &DocumentRecord,
            ) -> Result<(), StorageError> {
                Ok(())
            }
            async fn upsert_graph(
                &self,
                _document_id: &str,
                _graph: &ExtractedGraph,
            ) -> Result<(), StorageError> {
                Ok(())
            }
            async fn run_query(
                &self,
                _statement: &str,
                _parameters: Value,
            ) -> Result<Vec<Value>, StorageError> {
                Err(StorageError::Request("graph store is down".to_string()))
            }
            async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
                Ok(Vec::new())
            }
            async fn delete_document(&self, _file_name: &str) -> Result<(), StorageError> {
                Ok(())
            }
        }
        let graph = GraphProcessor::new(DownGraph, EchoModel::new());
        let coordinator = HybridCoordinator::new(
            vector,
            graph,
            EchoModel::new(),
            CoordinatorOptions::default(),
        );

        let comparison = coordinator
            .compare("Who works for Acme Corp?", None)
            .await
            .expect("comparison should succeed");

        assert!(!comparison.vector.is_answered());
        assert!(!comparison.graph.is_answered());
        match &comparison.hybrid {
            BranchOutcome::Unavailable { reason } => {
                assert_eq!(reason, BOTH_BRANCHES_DOWN);
            }
            BranchOutcome::Answered(_) => panic!("hybrid should be unavailable"),
        }
        assert!(coordinator.model.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn listing_returns_only_documents_present_in_both_stores() {
        let coordinator = coordinator(false, Vec::new());
        let documents = coordinator.list_documents().await.expect("list");
        assert_eq!(documents, vec!["report.pdf".to_string()]);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let coordinator = coordinator(false, Vec::new());
        let result = coordinator.compare("  ", None).await;
        assert!(matches!(result, Err(QueryError::EmptyQuery)));
    }
}
