use chrono::Utc;
use clap::{Parser, Subcommand};
use manual_rag_core::chat::read_faq;
use manual_rag_core::{
    chunk_file, convert_folder_best_effort, convert_pdf, load_upload_input, CharacterNgramEmbedder, ChatModel,
    ChatSession, ChunkingConfig, ContextGenerator, ContextOptions, ConvertOptions, Embedder, EmbeddingUploader,
    HistoryLog, HttpEmbedder, HttpEmbedderConfig, LlmConfig, OpenAiChatClient, PromptLoader, QdrantStore,
    RagOptions, RagPipeline, ScoredPoint, Searcher, Secrets, SparseEncoder, UploadMode, DEFAULT_EMBEDDING_MODEL,
};
use manual_rag_core::llm::{DEFAULT_LLM_MODEL, DEFAULT_LLM_URL};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "manual-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL; overrides the secrets file.
    #[arg(long, env = "QDRANT_URL", global = true)]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "manuals", global = true)]
    collection: String,

    /// Secrets TOML with `[openai]` and `[qdrant]` sections.
    #[arg(long, default_value = "secrets.toml", global = true)]
    secrets: PathBuf,

    /// YAML file of prompt templates.
    #[arg(long, global = true)]
    prompts: Option<PathBuf>,

    /// OpenAI-compatible embedding service. Without it an offline
    /// character-trigram embedder is used.
    #[arg(long, env = "EMBEDDING_URL", global = true)]
    embedding_url: Option<String>,

    /// Embedding model name, also the dense vector name in Qdrant.
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL, global = true)]
    embedding_model: String,

    /// Dimension of the embedding service's vectors.
    #[arg(long, default_value = "768", global = true)]
    embedding_dimensions: usize,

    /// OpenAI-compatible chat service.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_LLM_URL, global = true)]
    llm_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_LLM_MODEL, global = true)]
    llm_model: String,

    /// API key for the chat service; overrides the secrets file.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Append every search to this JSONL file.
    #[arg(long, global = true)]
    history: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a manual (or a folder of manuals) into ToC-matched sections.
    Convert {
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        pdf: Option<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Markdown export to use instead of the built-in text export.
        #[arg(long, requires = "pdf")]
        markdown: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Split matched sections into token-bounded chunks.
    Chunk {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "300")]
        token_limit: usize,
    },
    /// Generate situating context for every chunk with the LLM.
    Context {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "3")]
        window: usize,
        /// Seconds to wait before each LLM request.
        #[arg(long, default_value = "2")]
        delay: u64,
    },
    /// Embed chunks and upload them to Qdrant.
    Upload {
        #[arg(long)]
        input: PathBuf,
        /// Also write bm25 sparse vectors.
        #[arg(long, default_value_t = false)]
        hybrid: bool,
        /// Context file produced by `context`.
        #[arg(long)]
        contexts: Option<PathBuf>,
    },
    /// Query the collection.
    Search {
        #[arg(long)]
        query: String,
        /// Fuse dense and sparse results with reciprocal rank fusion.
        #[arg(long, default_value_t = false)]
        hybrid: bool,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Answer a question from the indexed manuals.
    Ask {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = false)]
        verbose_search: bool,
        #[arg(long, default_value_t = false)]
        verbose_prompt: bool,
    },
    /// Interactive support chat on the terminal.
    Chat {
        /// One example question per line, shown as the input hint.
        #[arg(long)]
        faq: Option<PathBuf>,
    },
}

struct Settings {
    secrets: Secrets,
    qdrant_url: String,
}

impl Settings {
    fn load(cli: &Cli) -> anyhow::Result<Self> {
        let secrets = Secrets::load_or_default(&cli.secrets)?;
        let qdrant_url = cli
            .qdrant_url
            .clone()
            .unwrap_or_else(|| secrets.qdrant_url().to_string());
        Ok(Self { secrets, qdrant_url })
    }

    fn api_key(&self, cli: &Cli) -> anyhow::Result<String> {
        match &cli.api_key {
            Some(key) => Ok(key.clone()),
            None => Ok(self.secrets.require_api_key()?.to_string()),
        }
    }
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    match &cli.embedding_url {
        Some(url) => Ok(Arc::new(HttpEmbedder::new(HttpEmbedderConfig {
            url: url.clone(),
            model: cli.embedding_model.clone(),
            dimensions: cli.embedding_dimensions,
            ..HttpEmbedderConfig::default()
        })?)),
        None => {
            warn!("no --embedding-url given, using the offline character-trigram embedder");
            Ok(Arc::new(CharacterNgramEmbedder::default()))
        }
    }
}

fn build_llm(cli: &Cli, settings: &Settings) -> anyhow::Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(OpenAiChatClient::new(LlmConfig {
        url: cli.llm_url.clone(),
        model: cli.llm_model.clone(),
        api_key: Some(settings.api_key(cli)?),
        ..LlmConfig::default()
    })?))
}

fn build_prompts(cli: &Cli) -> anyhow::Result<PromptLoader> {
    match &cli.prompts {
        Some(path) => Ok(PromptLoader::from_path(path)?),
        None => Ok(PromptLoader::default()),
    }
}

fn build_store(cli: &Cli, settings: &Settings, embedder: &dyn Embedder) -> anyhow::Result<QdrantStore> {
    Ok(QdrantStore::new(
        &settings.qdrant_url,
        cli.collection.as_str(),
        embedder.model_name(),
    )?)
}

fn build_searcher(
    cli: &Cli,
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<Searcher<QdrantStore, QdrantStore>> {
    let vector = build_store(cli, settings, embedder.as_ref())?;
    let keyword = build_store(cli, settings, embedder.as_ref())?;
    let mut searcher = Searcher::new(vector, keyword, embedder, SparseEncoder::new()?);
    if let Some(path) = &cli.history {
        searcher = searcher.with_history(HistoryLog::new(path.clone()));
    }
    Ok(searcher)
}

fn print_results(results: &[ScoredPoint]) {
    for (rank, point) in results.iter().enumerate() {
        let payload = &point.payload;
        println!(
            "{}. [{}] score={:.4} manual={} chapter={} page={}",
            rank + 1,
            point.id,
            point.score,
            payload.manual,
            payload.chapter,
            payload.page
        );
        println!("   {}", payload.content.replace('\n', "\n   "));
    }
}

fn convert_one(pdf: &Path, options: &ConvertOptions) -> anyhow::Result<()> {
    let manual = convert_pdf(pdf, options)?;
    println!(
        "{} sections -> {}",
        manual.sections.len(),
        manual.content_path.display()
    );
    Ok(())
}

async fn run_chat(cli: &Cli, settings: &Settings, faq: Option<&Path>) -> anyhow::Result<()> {
    let embedder = build_embedder(cli)?;
    let pipeline = RagPipeline::new(
        build_searcher(cli, settings, embedder)?,
        build_llm(cli, settings)?,
        build_prompts(cli)?,
        RagOptions::default(),
    );

    let faq = match faq {
        Some(path) => read_faq(path)?,
        None => Vec::new(),
    };
    let mut session = ChatSession::with_faq(&faq);
    info!(session = %session.id(), "chat session started");

    for message in session.visible_messages() {
        println!("{}\n", message.content);
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout
            .write_all(format!("({}) > ", session.placeholder()).as_bytes())
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let reply = session.send(line, &pipeline).await;
        println!("\n{reply}\n");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        qdrant = %settings.qdrant_url,
        collection = %cli.collection,
        "manual-rag boot"
    );

    match &cli.command {
        Command::Convert {
            pdf,
            folder,
            markdown,
            output_dir,
        } => {
            let options = ConvertOptions {
                markdown_override: markdown.clone(),
                output_dir: output_dir.clone(),
            };

            if let Some(pdf) = pdf {
                convert_one(pdf, &options)?;
            } else if let Some(folder) = folder {
                let report = convert_folder_best_effort(folder, &options)?;
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                println!(
                    "{} manuals converted, {} skipped",
                    report.converted.len(),
                    report.skipped_files.len()
                );
            }
        }
        Command::Chunk {
            input,
            output,
            token_limit,
        } => {
            let records = chunk_file(
                input,
                output,
                ChunkingConfig {
                    token_limit: *token_limit,
                },
            )?;
            println!("{} chunks -> {}", records.len(), output.display());
        }
        Command::Context {
            input,
            output,
            window,
            delay,
        } => {
            let llm = build_llm(&cli, &settings)?;
            let generator = ContextGenerator::new(
                build_prompts(&cli)?,
                ContextOptions {
                    window_size: *window,
                    request_delay: Duration::from_secs(*delay),
                },
            );
            let contexts = generator.generate_file(input, output, llm.as_ref()).await?;
            println!("{} contexts -> {}", contexts.len(), output.display());
        }
        Command::Upload {
            input,
            hybrid,
            contexts,
        } => {
            let mode = if *hybrid { UploadMode::Hybrid } else { UploadMode::Dense };
            let upload = load_upload_input(input, contexts.as_deref(), mode)?;
            let embedder = build_embedder(&cli)?;
            let store = build_store(&cli, &settings, embedder.as_ref())?;
            let uploader = EmbeddingUploader::new(store, embedder, SparseEncoder::new()?);

            let written = uploader.upload(&upload, mode).await?;
            println!(
                "{written} points from '{}' uploaded to '{}' at {}",
                upload.title,
                cli.collection,
                Utc::now().to_rfc3339()
            );
        }
        Command::Search { query, hybrid, limit } => {
            let searcher = build_searcher(&cli, &settings, build_embedder(&cli)?)?;
            let results = if *hybrid {
                searcher.rrf_search(query, *limit).await?
            } else {
                searcher.search(query, *limit).await?
            };
            println!("query: {query}");
            print_results(&results);
        }
        Command::Ask {
            query,
            verbose_search,
            verbose_prompt,
        } => {
            let embedder = build_embedder(&cli)?;
            let pipeline = RagPipeline::new(
                build_searcher(&cli, &settings, embedder)?,
                build_llm(&cli, &settings)?,
                build_prompts(&cli)?,
                RagOptions::default(),
            );

            let answer = pipeline.run(query).await?;
            if *verbose_search {
                for alternate in &answer.queries {
                    println!("query: {alternate}");
                }
                print_results(&answer.results);
                println!();
            }
            if *verbose_prompt {
                println!("{}\n", answer.prompt);
            }
            println!("{}", answer.answer);
        }
        Command::Chat { faq } => {
            run_chat(&cli, &settings, faq.as_deref()).await?;
        }
    }

    Ok(())
}
