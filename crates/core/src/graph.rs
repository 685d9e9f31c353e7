use crate::completion::ChatModel;
use crate::cypher::{
    sanitize_generated, significant_terms, translation_prompt, validate_cypher, BROADEN_QUERY,
    TRANSLATION_SYSTEM_PROMPT,
};
use crate::error::{IngestError, QueryError, QueryTranslationError, StorageError};
use crate::extraction::{extraction_prompt, parse_extraction, EXTRACTION_SYSTEM_PROMPT};
use crate::models::{DocumentRecord, ExtractedGraph, ModeAnswer, RetrievalMode};
use crate::traits::GraphStore;
use serde_json::json;

const GRAPH_ANSWER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions based on graph data.";
const EXTRACTION_MAX_TOKENS: u32 = 1_000;
const TRANSLATION_MAX_TOKENS: u32 = 150;
const ANSWER_MAX_TOKENS: u32 = 100;
const NO_MATCH_ANSWER: &str = "No relevant information found in graph.";

/// Characters of document text sent per extraction call, sized to stay
/// well inside the completion model's context window.
const EXTRACTION_WINDOW_CHARS: usize = 6_000;

pub struct GraphProcessor<G, C> {
    store: G,
    model: C,
}

#[derive(Debug, Clone)]
pub struct SkippedWindow {
    pub window_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GraphIngestReport {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub skipped_windows: Vec<SkippedWindow>,
}

impl<G, C> GraphProcessor<G, C>
where
    G: GraphStore + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub fn new(store: G, model: C) -> Self {
        Self { store, model }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        self.store.ensure_schema().await
    }

    /// Extracts entities and relationships window by window, best-effort:
    /// a window whose output fails validation is recorded and skipped, the
    /// rest of the document still lands in the graph.
    pub async fn ingest(&self, document: &DocumentRecord) -> Result<GraphIngestReport, IngestError> {
        let mut graph = ExtractedGraph::default();
        let mut skipped_windows = Vec::new();

        for (window_index, window) in
            extraction_windows(&document.text, EXTRACTION_WINDOW_CHARS).enumerate()
        {
            let raw = self
                .model
                .complete(
                    EXTRACTION_SYSTEM_PROMPT,
                    &extraction_prompt(&window),
                    EXTRACTION_MAX_TOKENS,
                )
                .await?;

            match parse_extraction(&raw) {
                Ok(window_graph) => graph.merge(window_graph),
                Err(error) => skipped_windows.push(SkippedWindow {
                    window_index,
                    reason: error.to_string(),
                }),
            }
        }

        self.store.upsert_document(document).await?;
        self.store.upsert_graph(&document.document_id, &graph).await?;

        Ok(GraphIngestReport {
            entity_count: graph.entities.len(),
            relationship_count: graph.relationships.len(),
            skipped_windows,
        })
    }

    pub async fn query(&self, question: &str) -> Result<ModeAnswer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let generated = self
            .model
            .complete(
                TRANSLATION_SYSTEM_PROMPT,
                &translation_prompt(question),
                TRANSLATION_MAX_TOKENS,
            )
            .await
            .map_err(QueryTranslationError::Completion)?;

        let statement = sanitize_generated(&generated);
        validate_cypher(&statement)?;

        let mut rows = self.store.run_query(&statement, json!({})).await?;

        // One broadened retry on an empty result, never more.
        if rows.is_empty() {
            let terms = significant_terms(question);
            if !terms.is_empty() {
                rows = self
                    .store
                    .run_query(BROADEN_QUERY, json!({ "terms": terms }))
                    .await?;
            }
        }

        if rows.is_empty() {
            return Ok(ModeAnswer {
                mode: RetrievalMode::Graph,
                answer: NO_MATCH_ANSWER.to_string(),
                evidence: Vec::new(),
            });
        }

        let evidence: Vec<String> = rows.iter().map(|row| row.to_string()).collect();
        let answer = self
            .model
            .complete(
                GRAPH_ANSWER_SYSTEM_PROMPT,
                &graph_answer_prompt(question, &evidence.join("\n")),
                ANSWER_MAX_TOKENS,
            )
            .await?;

        Ok(ModeAnswer {
            mode: RetrievalMode::Graph,
            answer,
            evidence,
        })
    }

    pub async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
        self.store.list_documents().await
    }

    pub async fn delete_document(&self, file_name: &str) -> Result<(), StorageError> {
        self.store.delete_document(file_name).await
    }
}

fn graph_answer_prompt(question: &str, records: &str) -> String {
    format!(
        "Based solely on the provided graph data, provide a concise, accurate answer \
         to the question. Do not use external knowledge. If the graph data contains \
         multiple relationships, list them all in a human-readable format.\n\n\
         Question: {question}\n\
         Graph Data: {records}\n\n\
         Answer:"
    )
}

fn extraction_windows(text: &str, window_chars: usize) -> impl Iterator<Item = String> + '_ {
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0;

    std::iter::from_fn(move || {
        while start < chars.len() {
            let end = (start + window_chars).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            start = end;
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        None
    })
}
