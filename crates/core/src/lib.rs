pub mod chunking;
pub mod completion;
pub mod cypher;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod extractor;
pub mod graph;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;
pub mod vector;

pub use chunking::{build_chunks, normalize_whitespace, split_text};
pub use completion::{ChatModel, OpenAiChatModel, DEFAULT_COMPLETION_MODEL};
pub use embeddings::{
    Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
};
pub use error::{
    CompletionError, EmbeddingError, ExtractionError, ExtractionParseError, IngestError,
    QueryError, QueryTranslationError, StorageError,
};
pub use extraction::parse_extraction;
pub use extractor::{extract_document_text, LopdfExtractor, PageText, PdfExtractor};
pub use graph::{GraphIngestReport, GraphProcessor, SkippedWindow};
pub use models::{
    BranchOutcome, ChunkingOptions, DocumentChunk, DocumentRecord, Entity, ExtractedGraph,
    ModeAnswer, QueryComparison, Relationship, RetrievalMode, ScoredChunk,
};
pub use orchestrator::{CoordinatorOptions, HybridCoordinator, IngestionSummary};
pub use stores::{Neo4jStore, QdrantStore};
pub use traits::{GraphStore, VectorIndex};
pub use vector::VectorProcessor;
