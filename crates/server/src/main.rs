mod routes;

use chrono::Utc;
use clap::Parser;
use pdf_qa_core::{
    ChunkingOptions, CoordinatorOptions, GraphProcessor, HybridCoordinator, Neo4jStore,
    OpenAiChatModel, OpenAiEmbedder, QdrantStore, VectorProcessor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "pdf-qa-server", version)]
struct Cli {
    /// Address to serve the web interface on.
    #[arg(long, default_value = "0.0.0.0:7860")]
    bind: String,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_url: Url,

    /// API key used for both the embedding and completion endpoints.
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier.
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding dimensionality; must match the embedding model.
    #[arg(long, default_value = "1536")]
    embedding_dimensions: usize,

    /// Completion model identifier.
    #[arg(long, default_value = "gpt-4o-mini")]
    completion_model: String,

    /// Qdrant base URL.
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: Url,

    /// Qdrant API key, if the instance requires one.
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Qdrant collection name.
    #[arg(long, default_value = "pdf_text_vectors")]
    qdrant_collection: String,

    /// Neo4j HTTP endpoint.
    #[arg(long, env = "NEO4J_URI", default_value = "http://localhost:7474")]
    neo4j_url: Url,

    /// Neo4j database name.
    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j")]
    neo4j_db: String,

    /// Neo4j username.
    #[arg(long, env = "NEO4J_USERNAME", default_value = "neo4j")]
    neo4j_user: String,

    /// Neo4j password.
    #[arg(long, env = "NEO4J_PASSWORD", default_value = "password")]
    neo4j_password: String,

    /// Target chunk size in characters.
    #[arg(long, default_value = "1200")]
    chunk_chars: usize,

    /// Overlap between consecutive chunks in characters.
    #[arg(long, default_value = "120")]
    chunk_overlap: usize,

    /// Nearest chunks retrieved per vector query.
    #[arg(long, default_value = "5")]
    top_k: usize,

    /// Per-branch timeout in seconds for hybrid queries.
    #[arg(long, default_value = "60")]
    branch_timeout_secs: u64,
}

fn base_url(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = OpenAiEmbedder::new(
        base_url(&cli.openai_url),
        &cli.openai_api_key,
        &cli.embedding_model,
        cli.embedding_dimensions,
    );
    let chat = OpenAiChatModel::new(
        base_url(&cli.openai_url),
        &cli.openai_api_key,
        &cli.completion_model,
    );

    let vector_store = QdrantStore::new(
        base_url(&cli.qdrant_url),
        &cli.qdrant_collection,
        cli.qdrant_api_key.clone(),
        cli.embedding_dimensions,
    );
    let graph_store = Neo4jStore::new(
        base_url(&cli.neo4j_url),
        &cli.neo4j_db,
        &cli.neo4j_user,
        &cli.neo4j_password,
    );

    let options = CoordinatorOptions {
        chunking: ChunkingOptions {
            chunk_chars: cli.chunk_chars,
            overlap_chars: cli.chunk_overlap,
            ..ChunkingOptions::default()
        },
        top_k: cli.top_k,
        branch_timeout: Duration::from_secs(cli.branch_timeout_secs),
    };

    let coordinator = HybridCoordinator::new(
        VectorProcessor::new(embedder, vector_store, chat.clone()),
        GraphProcessor::new(graph_store, chat.clone()),
        chat,
        options,
    );

    coordinator
        .init()
        .await
        .map_err(|error| anyhow::anyhow!("startup init failed: {error}"))?;

    let state = Arc::new(routes::AppState { coordinator });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind.as_str()).await?;
    info!(
        version = app_version,
        address = %cli.bind,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-qa-server boot"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("pdf-qa-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "unable to listen for shutdown signal");
    }
}
