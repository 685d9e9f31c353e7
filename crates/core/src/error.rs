use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf is encrypted: {0}")]
    Encrypted(String),

    #[error("pdf has no extractable text layer: {0}")]
    NoTextLayer(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding api returned {status}: {details}")]
    Api { status: u16, details: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding count {got} does not match input count {expected}")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding dimension {got} does not match configured {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion api returned {status}: {details}")]
    Api { status: u16, details: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ExtractionParseError {
    #[error("extraction output is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("extraction output failed validation: {0}")]
    Schema(String),
}

#[derive(Debug, Error)]
pub enum QueryTranslationError {
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("generated statement is not usable cypher: {0}")]
    InvalidCypher(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("extraction parse error: {0}")]
    ExtractionParse(#[from] ExtractionParseError),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("query translation error: {0}")]
    Translation(#[from] QueryTranslationError),
}
