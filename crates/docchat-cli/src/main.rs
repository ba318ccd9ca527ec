//! DocChat CLI
//!
//! Usage:
//!   docchat ingest <data-dir> [--extension .md] [--index <dir>]
//!   docchat ask <question> [--session <id>] [--index <dir>]
//!   docchat chat [--index <dir>]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docchat_core::{AppConfig, GenerationParams};
use docchat_ingest::IngestPipeline;
use docchat_rag::{create_chat_client, ChatEngine, SqliteConversationStore};
use docchat_vector::{create_embedding_client, VectorIndex};

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Retrieval-augmented chatbot over a local document corpus")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file; environment variables are used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed, and index a directory of documents
    Ingest {
        /// Directory containing the corpus
        data_dir: PathBuf,

        /// File extension to ingest, including the dot
        #[arg(long, default_value = ".md")]
        extension: String,

        /// Where to persist the index (defaults to the configured path)
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Ask a single question
    Ask {
        /// Question to ask
        question: String,

        /// Session id to continue an existing conversation
        #[arg(long)]
        session: Option<String>,

        /// Index directory to load (defaults to the configured path)
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Interactive chat ("stop" quits, "start" begins a new conversation)
    Chat {
        /// Index directory to load (defaults to the configured path)
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    match cli.command {
        Commands::Ingest {
            data_dir,
            extension,
            index,
        } => ingest(&config, &data_dir, &extension, index).await,
        Commands::Ask {
            question,
            session,
            index,
        } => ask(&config, &question, session.as_deref(), index).await,
        Commands::Chat { index } => chat(&config, index).await,
    }
}

async fn ingest(
    config: &AppConfig,
    data_dir: &std::path::Path,
    extension: &str,
    index_override: Option<PathBuf>,
) -> anyhow::Result<()> {
    let embedder: Arc<dyn docchat_vector::EmbeddingClient> =
        Arc::from(create_embedding_client(&config.llm)?);
    let index = Arc::new(VectorIndex::new(embedder.dimension(), &config.index));

    let pipeline = IngestPipeline::new(&config.rag, embedder, index.clone())?;
    let index_path = index_override.unwrap_or_else(|| config.index.path.clone());
    let report = pipeline
        .run_and_persist(data_dir, extension, &index_path)
        .await?;

    println!(
        "Indexed {} chunks from {} files ({} skipped) into {}",
        report.chunks_indexed,
        report.files_indexed,
        report.skipped.len(),
        index_path.display()
    );
    for (path, reason) in &report.skipped {
        println!("warning: skipped {}: {reason}", path.display());
    }
    Ok(())
}

async fn build_engine(
    config: &AppConfig,
    index_override: Option<PathBuf>,
) -> anyhow::Result<ChatEngine> {
    let embedder: Arc<dyn docchat_vector::EmbeddingClient> =
        Arc::from(create_embedding_client(&config.llm)?);
    let llm: Arc<dyn docchat_core::ChatClient> = Arc::from(create_chat_client(&config.llm)?);

    let index_path = index_override.unwrap_or_else(|| config.index.path.clone());
    let index = Arc::new(VectorIndex::load(&index_path, embedder.dimension()).await?);
    let store = Arc::new(SqliteConversationStore::connect(&config.rag.history_db).await?);

    let params = GenerationParams {
        max_tokens: config.llm.max_tokens,
        temperature: config.llm.temperature,
    };

    Ok(
        ChatEngine::new(index, embedder, llm, store, config.rag.clone())
            .with_generation_params(params),
    )
}

async fn ask(
    config: &AppConfig,
    question: &str,
    session: Option<&str>,
    index_override: Option<PathBuf>,
) -> anyhow::Result<()> {
    let engine = build_engine(config, index_override).await?;
    let outcome = engine.answer(question, session).await?;

    println!("{}", outcome.response);
    println!("(session: {})", outcome.session_id);
    Ok(())
}

async fn chat(config: &AppConfig, index_override: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = build_engine(config, index_override).await?;

    println!("Chatbot: Hello! I'm your assistant. How can I help you today?");

    let stdin = io::stdin();
    let mut session: Option<String> = None;

    loop {
        print!("User: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("stop") {
            println!("Chatbot: Goodbye! Take care!");
            break;
        }
        if input.eq_ignore_ascii_case("start") {
            println!("{}", "--".repeat(20));
            println!("Starting a new conversation");
            session = None;
            continue;
        }

        match engine.answer(input, session.as_deref()).await {
            Ok(outcome) => {
                println!("Chatbot: {}", outcome.response);
                session = Some(outcome.session_id);
            }
            Err(e) => {
                eprintln!("Chatbot error: {e}");
            }
        }
    }

    Ok(())
}
