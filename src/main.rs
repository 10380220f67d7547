//! docsync - keeps a vector index in step with a directory of documents
//!
//! Entry point for the server, the one-shot sync and the watcher.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use docsync::answer::{AnswerModel, ChatCompletionsClient, ChatConfig};
use docsync::config::{EmbeddingProvider, IndexBackend};
use docsync::embeddings::{Embedder, EmbeddingConfig, HashEmbedder, OpenAiEmbedder};
use docsync::query::QueryService;
use docsync::server::{
    cancel_on_signal, init_tracing, metrics, App, AppState, ServerConfig, TracingConfig,
};
use docsync::storage::{Database, Distance, QdrantConfig, QdrantIndex, SqliteIndex, VectorIndex};
use docsync::sync::SyncEngine;
use docsync::watcher::{ChangeDebouncer, DebouncerHandle, DirectoryWatcher};
use docsync::{Config, Error, Result};
use tokio_util::sync::CancellationToken;

/// docsync - keeps a vector index in step with a directory of documents
#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory of documents to keep in sync
    #[arg(short, long, env = "DOCSYNC_DOCS_DIR", default_value = "./example_docs")]
    docs_dir: PathBuf,

    /// File extensions that count as documents
    #[arg(long, env = "DOCSYNC_EXTENSIONS", value_delimiter = ',', default_value = "txt")]
    extensions: Vec<String>,

    /// Gitignore-style patterns excluded from the document set
    #[arg(long = "ignore", env = "DOCSYNC_IGNORE", value_delimiter = ',')]
    ignore_patterns: Vec<String>,

    /// Vector index backend
    #[arg(long, env = "DOCSYNC_INDEX_BACKEND", value_enum, default_value = "qdrant")]
    index_backend: IndexBackend,

    /// Qdrant host
    #[arg(long, env = "DOCSYNC_INDEX_HOST", default_value = "localhost")]
    index_host: String,

    /// Qdrant HTTP port
    #[arg(long, env = "DOCSYNC_INDEX_PORT", default_value = "6333")]
    index_port: u16,

    /// Collection holding the documents
    #[arg(long, env = "DOCSYNC_COLLECTION", default_value = "docs")]
    collection: String,

    /// Data directory for the `SQLite` backend
    #[arg(long, env = "DOCSYNC_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Largest index a snapshot read will accept
    #[arg(long, env = "DOCSYNC_MAX_SCAN", default_value = "10000")]
    max_scan: usize,

    /// Quiet period after the last change before a sync starts
    #[arg(long, env = "DOCSYNC_DEBOUNCE_MS", default_value = "1000")]
    debounce_ms: u64,

    /// Upper bound on one sync cycle
    #[arg(long, env = "DOCSYNC_SYNC_TIMEOUT_SECS", default_value = "300")]
    sync_timeout_secs: u64,

    /// Index writes in flight per cycle
    #[arg(long, env = "DOCSYNC_SYNC_CONCURRENCY", default_value = "4")]
    sync_concurrency: usize,

    /// Embedding provider
    #[arg(long, env = "DOCSYNC_EMBEDDING_PROVIDER", value_enum, default_value = "openai")]
    embedding_provider: EmbeddingProvider,

    /// Base URL of the embeddings API
    #[arg(long, env = "DOCSYNC_EMBEDDING_URL", default_value = "http://localhost:8081/v1")]
    embedding_url: String,

    /// Embedding model name
    #[arg(
        long,
        env = "DOCSYNC_EMBEDDING_MODEL",
        default_value = "sentence-transformers/all-MiniLM-L6-v2"
    )]
    embedding_model: String,

    /// Embedding vector length
    #[arg(long, env = "DOCSYNC_EMBEDDING_DIMS", default_value = "384")]
    embedding_dims: usize,

    /// Bearer token for the embeddings API
    #[arg(long, env = "DOCSYNC_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Base URL of the chat completions API
    #[arg(long, env = "DOCSYNC_LLM_URL", default_value = "https://api.groq.com/openai/v1")]
    llm_url: String,

    /// Chat model name
    #[arg(long, env = "DOCSYNC_LLM_MODEL", default_value = "llama-3.3-70b-versatile")]
    llm_model: String,

    /// Bearer token for the chat completions API
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Documents retrieved per question
    #[arg(long, env = "DOCSYNC_TOP_K", default_value = "3")]
    top_k: usize,

    /// Host address to bind to
    #[arg(long, env = "DOCSYNC_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "DOCSYNC_PORT", default_value = "8000")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DOCSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DOCSYNC_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Watch the directory and serve questions over HTTP (default)
    Serve,
    /// Run one reconciliation and exit
    Sync,
    /// Watch the directory without the HTTP server
    Watch,
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            docs_dir: cli.docs_dir.clone(),
            extensions: cli.extensions.clone(),
            ignore_patterns: cli.ignore_patterns.clone(),
            index_backend: cli.index_backend,
            index_host: cli.index_host.clone(),
            index_port: cli.index_port,
            collection: cli.collection.clone(),
            data_dir: cli.data_dir.clone(),
            max_scan: cli.max_scan,
            debounce: Duration::from_millis(cli.debounce_ms),
            sync_timeout: Duration::from_secs(cli.sync_timeout_secs),
            sync_concurrency: cli.sync_concurrency,
            embedding_provider: cli.embedding_provider,
            embedding_url: cli.embedding_url.clone(),
            embedding_model: cli.embedding_model.clone(),
            embedding_dims: cli.embedding_dims,
            embedding_api_key: cli.embedding_api_key.clone(),
            llm_url: cli.llm_url.clone(),
            llm_model: cli.llm_model.clone(),
            llm_api_key: cli.llm_api_key.clone(),
            top_k: cli.top_k,
            host: cli.host.clone(),
            port: cli.port,
            log_level: cli.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    tracing::info!("docsync v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from(&cli);
    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;
    config.verify_docs_dir()?;

    metrics::init_metrics();

    let index = connect_index(&config).await?;
    let embedder = build_embedder(&config)?;
    let engine = Arc::new(SyncEngine::from_config(
        &config,
        Arc::clone(&index),
        Arc::clone(&embedder),
    )?);

    tracing::info!(
        docs_dir = %config.docs_dir.display(),
        index = index.name(),
        collection = %config.collection,
        "Startup checks passed"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Sync => sync_once(&engine).await,
        Command::Watch => {
            let cancel = CancellationToken::new();
            cancel_on_signal(cancel.clone());
            let (debouncer, _watcher) = start_watching(&config, &engine, &cancel)?;

            cancel.cancelled().await;
            debouncer.join().await;
            Ok(())
        }
        Command::Serve => {
            let cancel = CancellationToken::new();
            cancel_on_signal(cancel.clone());
            let (debouncer, _watcher) = start_watching(&config, &engine, &cancel)?;

            let state = Arc::new(AppState {
                query: QueryService::new(
                    embedder,
                    Arc::clone(&index),
                    build_answer_model(&config)?,
                    config.top_k,
                ),
                index,
                engine,
                debouncer: debouncer.clone(),
            });

            let result = App::new(ServerConfig::from(&config), state)
                .run(cancel.clone())
                .await;

            cancel.cancel();
            debouncer.join().await;
            result
        }
    }
}

/// Open the configured index, verify it answers, and create the collection.
async fn connect_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.index_backend {
        IndexBackend::Qdrant => Arc::new(QdrantIndex::new(QdrantConfig::new(
            config.index_url(),
            config.collection.clone(),
        ))?),
        IndexBackend::Sqlite => {
            std::fs::create_dir_all(&config.data_dir)?;
            Arc::new(SqliteIndex::new(Database::open(config.database_path())?))
        }
    };

    index.health_check().await.map_err(|e| {
        Error::config(format!(
            "{} index is not reachable at startup: {e}",
            index.name()
        ))
    })?;
    index
        .ensure_schema(config.embedding_dims, Distance::Cosine)
        .await?;

    Ok(index)
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding_provider {
        EmbeddingProvider::Openai => {
            let mut embedding = EmbeddingConfig::new(
                &config.embedding_url,
                &config.embedding_model,
                config.embedding_dims,
            );
            embedding.api_key.clone_from(&config.embedding_api_key);
            Ok(Arc::new(OpenAiEmbedder::new(embedding)?))
        }
        EmbeddingProvider::Hash => {
            tracing::warn!("Using hash embeddings; similarity is lexical only");
            Ok(Arc::new(HashEmbedder::new(config.embedding_dims)))
        }
    }
}

fn build_answer_model(config: &Config) -> Result<Arc<dyn AnswerModel>> {
    if config.llm_api_key.is_none() {
        tracing::warn!("No chat API key configured; /ask will fail until one is set");
    }
    let mut chat = ChatConfig::new(&config.llm_url, &config.llm_model);
    chat.api_key.clone_from(&config.llm_api_key);
    Ok(Arc::new(ChatCompletionsClient::new(chat)?))
}

/// Spawn the debouncer, queue the initial sync, and attach the watcher.
fn start_watching(
    config: &Config,
    engine: &Arc<SyncEngine>,
    cancel: &CancellationToken,
) -> Result<(DebouncerHandle, DirectoryWatcher)> {
    let debouncer = ChangeDebouncer::spawn(engine.clone(), config.debounce, cancel.clone());
    debouncer.notify();

    let watcher = DirectoryWatcher::start(engine.filter().clone(), debouncer.clone())?;
    tracing::info!(
        path = %watcher.path().display(),
        debounce_ms = u64::try_from(config.debounce.as_millis()).unwrap_or(u64::MAX),
        "Watching for document changes"
    );

    Ok((debouncer, watcher))
}

async fn sync_once(engine: &SyncEngine) -> Result<()> {
    let report = engine.run_cycle().await?;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to render sync report"),
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(Error::internal(format!(
            "{} planned operations failed; rerun to retry them",
            report.failed
        )))
    }
}
