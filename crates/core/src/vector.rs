use crate::completion::ChatModel;
use crate::embeddings::{Embedder, EMBEDDING_BATCH_LIMIT};
use crate::error::{IngestError, QueryError, StorageError};
use crate::models::{DocumentChunk, ModeAnswer, RetrievalMode};
use crate::traits::VectorIndex;

const ANSWER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions based on provided context.";
const ANSWER_MAX_TOKENS: u32 = 100;
const NO_MATCH_ANSWER: &str = "No relevant information found.";

pub struct VectorProcessor<E, V, C> {
    embedder: E,
    index: V,
    model: C,
}

impl<E, V, C> VectorProcessor<E, V, C>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub fn new(embedder: E, index: V, model: C) -> Self {
        Self {
            embedder,
            index,
            model,
        }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        self.index
            .ensure_collection(self.embedder.dimensions())
            .await
    }

    /// Embeds and upserts the chunks batch by batch. Not transactional:
    /// batches already written stay written if a later batch fails.
    pub async fn ingest(&self, chunks: &[DocumentChunk]) -> Result<usize, IngestError> {
        let mut written = 0;

        for batch in chunks.chunks(EMBEDDING_BATCH_LIMIT) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            self.index.upsert_chunks(batch, &embeddings).await?;
            written += batch.len();
        }

        Ok(written)
    }

    pub async fn query(&self, question: &str, top_k: usize) -> Result<ModeAnswer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let query_vector = self.embedder.embed_query(question).await?;
        let hits = self.index.search(&query_vector, top_k).await?;

        if hits.is_empty() {
            return Ok(ModeAnswer {
                mode: RetrievalMode::Vector,
                answer: NO_MATCH_ANSWER.to_string(),
                evidence: Vec::new(),
            });
        }

        let evidence: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();
        let context = evidence.join("\n\n");
        let source = hits[0].file_name.clone();

        let answer = self
            .model
            .complete(
                ANSWER_SYSTEM_PROMPT,
                &context_answer_prompt(question, &context),
                ANSWER_MAX_TOKENS,
            )
            .await?;

        // Only answers actually drawn from the context get a citation.
        let answer = if answer.contains("context does not") || source.is_empty() {
            answer
        } else {
            format!("{answer} [Source: {source}]")
        };

        Ok(ModeAnswer {
            mode: RetrievalMode::Vector,
            answer,
            evidence,
        })
    }

    pub async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
        self.index.list_documents().await
    }

    pub async fn delete_document(&self, file_name: &str) -> Result<(), StorageError> {
        self.index.delete_document(file_name).await
    }
}

fn context_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Based solely on the provided context, provide a concise, accurate answer \
         to the question. Do not use external knowledge.\n\n\
         Question: {question}\n\
         Context: {context}\n\n\
         Answer:"
    )
}
