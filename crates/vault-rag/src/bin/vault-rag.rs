//! vault-rag command line
//!
//! Run with: cargo run -p vault-rag --features cli -- <command>

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vault_rag::config::EmbeddingBackend;
use vault_rag::providers::{DocumentStore, LocalDocumentStore, OllamaClient};
use vault_rag::retrieval::InMemoryIndex;
use vault_rag::{Document, QueryRequest, QueryScope, RagConfig, RagEngine};

/// Ask questions about your own documents.
///
/// Document metadata and the vector index live in the configured storage
/// directory; conversations only last for the running process.
#[derive(Parser)]
#[command(name = "vault-rag", version, about)]
struct Cli {
    /// Path to a TOML configuration file; built-in defaults are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a text file as a document and index it
    Ingest {
        /// Document id
        #[arg(long)]
        id: i64,

        /// Text file to ingest
        #[arg(long)]
        file: PathBuf,

        /// Owning user id
        #[arg(long, default_value_t = 0)]
        owner: i64,

        /// Category ids the document belongs to
        #[arg(long, value_delimiter = ',')]
        category: Vec<i64>,

        /// Expire the document this many days from now
        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// Answer a question from selected documents
    Query {
        /// Document ids to search, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with = "category")]
        docs: Vec<i64>,

        /// Search every document in a category instead
        #[arg(long)]
        category: Option<i64>,

        /// Conversation id to continue
        #[arg(long)]
        conversation: Option<String>,

        /// Backend configuration id; the default backend is used when absent
        #[arg(long)]
        backend: Option<i64>,

        /// The question
        question: String,
    },

    /// Remove a document and its chunks
    Forget {
        /// Document id
        #[arg(long)]
        id: i64,
    },

    /// Notify about soon-to-expire documents and delete expired ones
    Sweep,

    /// Run the expiry worker until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RagConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => RagConfig::default(),
    };

    if config.embeddings.backend == EmbeddingBackend::Ollama {
        let client = OllamaClient::new(
            &config.embeddings.base_url,
            std::time::Duration::from_secs(5),
            0,
        )?;
        if !client.health_check().await? {
            tracing::warn!("Ollama not available at {}", config.embeddings.base_url);
        }
    }

    let documents = Arc::new(LocalDocumentStore::open(&config.storage.data_dir)?);
    let index_path = config.storage.index_path();
    let index = Arc::new(InMemoryIndex::load(&index_path, config.embeddings.dimensions)?);

    let engine = RagEngine::builder(config)
        .documents(documents.clone())
        .index(index.clone())
        .build()?;

    match cli.command {
        Commands::Ingest {
            id,
            file,
            owner,
            category,
            expires_in_days,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let mut document = Document::new(id, owner, text.len() as u64);
            if let Some(name) = file.file_name() {
                document = document.with_filename(name.to_string_lossy());
            }
            for category_id in category {
                document = document.in_category(category_id);
            }
            if let Some(days) = expires_in_days {
                document = document.with_expiry(Utc::now() + Duration::days(days));
            }

            documents.insert(document, &text).await?;
            let chunks = engine.ingest(id, &text).await?;
            index.save(&index_path)?;
            println!("Indexed document {} as {} chunks", id, chunks);
        }

        Commands::Query {
            docs,
            category,
            conversation,
            backend,
            question,
        } => {
            let scope = match category {
                Some(category_id) => QueryScope::Category(category_id),
                None => QueryScope::Documents(docs),
            };
            let mut request = QueryRequest::scoped(question, scope);
            if let Some(conversation_id) = conversation {
                request = request.in_conversation(conversation_id);
            }
            if let Some(backend_id) = backend {
                request = request.with_backend(backend_id);
            }

            let response = engine.query(request).await?;
            println!("{}", response.answer);
            println!();
            println!(
                "conversation: {}  context chunks: {}  time: {}ms",
                response.conversation_id,
                response.context.len(),
                response.processing_time_ms
            );
        }

        Commands::Forget { id } => {
            let removed = engine.forget(id).await?;
            documents.delete(id).await?;
            index.save(&index_path)?;
            println!("Removed document {} ({} chunks)", id, removed);
        }

        Commands::Sweep => {
            let lifecycle = engine.lifecycle();
            let now = Utc::now();
            let notified = lifecycle.notify_expiring(now).await?;
            let report = lifecycle.sweep(now).await?;
            index.save(&index_path)?;
            println!("Notified {} owners", notified);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Watch => {
            let Some(handle) = engine.start_lifecycle() else {
                anyhow::bail!("the lifecycle worker is disabled in the configuration");
            };
            tracing::info!("Watching for expiring documents. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to wait for Ctrl+C")?;
            handle.shutdown().await?;
            index.save(&index_path)?;
        }
    }

    Ok(())
}
