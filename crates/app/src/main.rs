mod chat;
mod webhook;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use fraudguard_core::config::DEFAULT_EMBEDDING_MODEL;
use fraudguard_core::embeddings::DEFAULT_HF_BASE_URL;
use fraudguard_core::synthesis::DEFAULT_GROQ_BASE_URL;
use fraudguard_core::{
    build_index, Assistant, CharacterNgramEmbedder, Embedder, GroqChatModel,
    HuggingFaceEmbedder, HuggingFaceOptions, KeywordScreen, Metric, RagConfig, Retriever,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "fraudguard", version, about = "Fraud-awareness assistant over a local PDF library")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder of source PDFs.
    #[arg(long, env = "FRAUDGUARD_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Index artifact directory.
    #[arg(long, env = "FRAUDGUARD_INDEX_DIR", default_value = "faiss_index")]
    index_dir: PathBuf,

    /// Also read PDFs in subfolders of the data dir.
    #[arg(long, default_value_t = false)]
    recursive: bool,

    /// Maximum characters per chunk.
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, default_value_t = 20)]
    chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "FRAUDGUARD_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Similarity metric used when building the index.
    #[arg(long, value_enum, default_value_t = MetricArg::Cosine)]
    metric: MetricArg,

    /// Embedding backend. Must be the same for build-index and queries.
    #[arg(long, value_enum, env = "FRAUDGUARD_EMBEDDING_BACKEND", default_value_t = EmbeddingBackend::Huggingface)]
    embedding_backend: EmbeddingBackend,

    /// Hosted embedding model id.
    #[arg(long, env = "FRAUDGUARD_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Base URL of the Hugging Face inference router.
    #[arg(long, env = "HF_INFERENCE_URL", default_value = DEFAULT_HF_BASE_URL)]
    hf_base_url: String,

    /// Hugging Face access token.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// Vector width of the local embedder.
    #[arg(long, default_value_t = 128)]
    local_dimensions: usize,

    /// Chat model used to write answers.
    #[arg(long, env = "FRAUDGUARD_LLM_MODEL", default_value = "llama-3.3-70b-versatile")]
    llm_model: String,

    /// Sampling temperature for the chat model.
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible Groq API.
    #[arg(long, env = "GROQ_BASE_URL", default_value = DEFAULT_GROQ_BASE_URL)]
    groq_base_url: String,

    /// Timeout for embedding and chat requests, in seconds. Unset means no timeout.
    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the retrieval index from the PDF folder.
    BuildIndex {
        /// Log and skip PDFs that fail to parse instead of aborting.
        #[arg(long, default_value_t = false)]
        skip_unreadable: bool,
    },
    /// Print the chunks closest to a query.
    Search {
        #[arg(long)]
        query: String,
        /// Overrides --top-k for this search.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer one question with retrieved context.
    Ask {
        #[arg(long)]
        query: String,
        /// Also print the retrieved sources.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Interactive question loop on stdin.
    Chat,
    /// Run the WhatsApp webhook server.
    Serve {
        #[arg(long, env = "FRAUDGUARD_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
        /// Token Meta echoes back during webhook verification.
        #[arg(long, env = "VERIFY_TOKEN", hide_env_values = true)]
        verify_token: String,
        #[arg(long, env = "WHATSAPP_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long, env = "WHATSAPP_PHONE_NUMBER_ID")]
        phone_number_id: String,
        #[arg(long, env = "WHATSAPP_GRAPH_URL", default_value = webhook::DEFAULT_GRAPH_URL)]
        graph_url: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbeddingBackend {
    Huggingface,
    Local,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Cosine,
    Euclidean,
}

impl From<MetricArg> for Metric {
    fn from(value: MetricArg) -> Self {
        match value {
            MetricArg::Cosine => Metric::Cosine,
            MetricArg::Euclidean => Metric::Euclidean,
        }
    }
}

impl Cli {
    fn rag_config(&self) -> anyhow::Result<RagConfig> {
        let config = RagConfig::builder()
            .data_dir(&self.data_dir)
            .index_dir(&self.index_dir)
            .recursive(self.recursive)
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .metric(self.metric.into())
            .embedding_model(&self.embedding_model)
            .llm_model(&self.llm_model)
            .temperature(self.temperature)
            .build()
            .context("invalid configuration")?;
        Ok(config)
    }

    fn timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Construct the one embedder shared by everything in this process.
    fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedding_backend {
            EmbeddingBackend::Local => Arc::new(CharacterNgramEmbedder::new(self.local_dimensions)),
            EmbeddingBackend::Huggingface => Arc::new(
                HuggingFaceEmbedder::connect(HuggingFaceOptions {
                    model: self.embedding_model.clone(),
                    base_url: self.hf_base_url.clone(),
                    api_token: self.hf_token.clone(),
                    timeout: self.timeout(),
                })
                .context("embedding backend unavailable")?,
            ),
        };
        Ok(embedder)
    }

    fn retriever(&self) -> anyhow::Result<Arc<Retriever>> {
        let retriever = Retriever::open(self.embedder()?, &self.index_dir)
            .with_context(|| format!("cannot open index at {}", self.index_dir.display()))?;
        info!(index_dir = %self.index_dir.display(), chunks = retriever.index_len(), "retriever ready");
        Ok(Arc::new(retriever))
    }

    fn assistant(&self, config: &RagConfig) -> anyhow::Result<Assistant> {
        let api_key = self
            .groq_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("GROQ_API_KEY is not set")?;
        let model = GroqChatModel::with_base_url(
            api_key,
            &config.llm_model,
            config.temperature,
            &self.groq_base_url,
            self.timeout(),
        )?;
        Ok(Assistant::new(self.retriever()?, Arc::new(model), config.top_k))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    // A missing .env file is normal outside development.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Arc::new(Cli::parse());
    let config = cli.rag_config()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "fraudguard boot"
    );

    match &cli.command {
        Command::BuildIndex { skip_unreadable } => {
            let skip_unreadable = *skip_unreadable;
            let build_cli = Arc::clone(&cli);
            let report = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let embedder = build_cli.embedder()?;
                let report = build_index(&config, embedder.as_ref(), skip_unreadable)
                    .context("index build failed")?;
                Ok(report)
            })
            .await??;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            println!(
                "{} pdf files, {} pages, {} chunks indexed into {} ({}, {} dims, {}) at {}",
                report.files,
                report.documents,
                report.chunks,
                report.index_dir.display(),
                report.manifest.embedding_model,
                report.manifest.dimensions,
                report.manifest.metric,
                report.manifest.built_at.to_rfc3339()
            );
            if !report.skipped_files.is_empty() {
                println!("{} files skipped", report.skipped_files.len());
            }
        }
        Command::Search { query, top_k } => {
            let query = query.clone();
            let top_k = top_k.unwrap_or(config.top_k);
            let search_cli = Arc::clone(&cli);
            let hits = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let retriever = search_cli.retriever()?;
                Ok(retriever.retrieve(&query, top_k)?)
            })
            .await??;

            for (rank, hit) in hits.iter().enumerate() {
                println!("[{}] score={:.4} source={}", rank + 1, hit.score, hit.source);
                println!("{}\n", hit.text);
            }
        }
        Command::Ask {
            query,
            show_sources,
        } => {
            let query = query.clone();
            let show_sources = *show_sources;
            let ask_cli = Arc::clone(&cli);
            let answer = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let assistant = ask_cli.assistant(&config)?;
                Ok(assistant.answer(&query)?)
            })
            .await??;

            println!("{}", answer.text);
            if show_sources {
                for source in answer.sources {
                    println!("  source={} score={:.4}", source.source, source.score);
                }
            }
        }
        Command::Chat => {
            let chat_cli = Arc::clone(&cli);
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let assistant = chat_cli.assistant(&config)?;
                let stdin = std::io::stdin();
                chat::run(&assistant, stdin.lock(), std::io::stdout())
            })
            .await??;
        }
        Command::Serve {
            bind,
            verify_token,
            access_token,
            phone_number_id,
            graph_url,
        } => {
            let sender = webhook::WhatsAppSender::new(graph_url, phone_number_id, access_token)?;
            let state = webhook::WebhookState::new(
                verify_token,
                KeywordScreen::standard().context("invalid screening keywords")?,
                Arc::new(sender),
            );
            webhook::serve(bind, state).await?;
        }
    }

    Ok(())
}
