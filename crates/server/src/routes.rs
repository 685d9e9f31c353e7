use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use pdf_qa_core::{
    HybridCoordinator, IngestError, IngestionSummary, Neo4jStore, OpenAiChatModel, OpenAiEmbedder,
    QdrantStore, QueryComparison, QueryError, StorageError,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub type Coordinator = HybridCoordinator<OpenAiEmbedder, QdrantStore, Neo4jStore, OpenAiChatModel>;

pub struct AppState {
    pub coordinator: Coordinator,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/documents", post(upload_document).get(list_documents))
        .route("/api/documents/:file_name", delete(remove_document))
        .route("/api/query", post(run_query))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index_page() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    top_k: Option<usize>,
}

async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryComparison>, ApiError> {
    let comparison = state
        .coordinator
        .compare(&request.question, request.top_k)
        .await?;
    Ok(Json(comparison))
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestionSummary>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(format!("unreadable upload: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("uploaded file has no name"))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|error| ApiError::bad_request(format!("unreadable upload: {error}")))?;

        info!(file = %file_name, size = bytes.len(), "ingesting upload");
        let summary = state.coordinator.ingest_document(&file_name, &bytes).await?;

        if summary.skipped_extraction_windows > 0 {
            warn!(
                file = %file_name,
                skipped = summary.skipped_extraction_windows,
                "some extraction windows produced unusable output"
            );
        }
        info!(
            file = %file_name,
            chunks = summary.chunk_count,
            entities = summary.entity_count,
            relationships = summary.relationship_count,
            "ingestion complete"
        );

        return Ok(Json(summary));
    }

    Err(ApiError::bad_request("multipart field 'file' is required"))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let documents = state.coordinator.list_documents().await?;
    Ok(Json(documents))
}

async fn remove_document(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.coordinator.delete_document(&file_name).await?;
    info!(file = %file_name, "document removed");
    Ok(Json(json!({ "deleted": file_name })))
}

/// Errors leave the API as a readable message with a matching status,
/// never as a panic or raw debug dump.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        let status = match &error {
            IngestError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::InvalidChunkConfig(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        let status = match &error {
            QueryError::EmptyQuery => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: error.to_string(),
        }
    }
}
