use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chat::repl::run_chat;
use crate::chat::{ConversationController, Session, TurnOutcome};
use crate::config::{Config, IndexKind, get_config_dir};
use crate::database::{VectorStore, build_store};
use crate::embeddings::{Embedder, OllamaClient};
use crate::indexer::{IndexStrategy, Indexer};
use crate::llm::{ChatModel, OpenAiClient};
use crate::rag::{FollowupGenerator, RecommendGenerator};
use crate::retrieval::Retriever;

/// Use `--config-dir` when given, otherwise the platform default
#[inline]
pub fn resolve_config_dir(config_dir: Option<PathBuf>) -> Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(dir),
        None => Ok(get_config_dir()?),
    }
}

/// Process-wide clients, built once and shared by every command
pub struct AppContext {
    config: Config,
    embedder: Arc<OllamaClient>,
    store: Arc<dyn VectorStore>,
}

impl AppContext {
    #[inline]
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let config = Config::load(config_dir)?;
        Self::from_config(config).await
    }

    #[inline]
    pub async fn from_config(config: Config) -> Result<Self> {
        let embedder = Arc::new(
            OllamaClient::new(&config.embedding).context("Failed to create Ollama client")?,
        );
        let store = build_store(&config)
            .await
            .context("Failed to connect to the vector store")?;

        Ok(Self {
            config,
            embedder,
            store,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn index_name(&self, kind: IndexKind) -> &str {
        self.config.vector_store.index_name(kind)
    }

    /// The chat model needs `GPT_API_KEY`, so it is only built by commands that answer questions
    fn chat_model(&self) -> Result<Arc<dyn ChatModel>> {
        let api_key = self.config.gpt_api_key()?;
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiClient::new(&self.config.language_model, api_key)?);
        Ok(model)
    }

    #[inline]
    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.embedder) as Arc<dyn Embedder>,
            Arc::clone(&self.store),
            self.index_name(IndexKind::Abstracts),
            self.index_name(IndexKind::Contents),
        )
        .with_title_lookup_limit(self.config.retrieval.title_lookup_limit)
    }

    #[inline]
    pub fn controller(&self) -> Result<ConversationController> {
        let model = self.chat_model()?;
        let retriever = Arc::new(self.retriever());

        let recommender = RecommendGenerator::new(
            Arc::clone(&retriever),
            Arc::clone(&model),
            self.config.retrieval.top_k,
        );
        let followup = FollowupGenerator::new(model, &self.config.retrieval);

        Ok(ConversationController::new(
            recommender,
            followup,
            retriever,
        ))
    }
}

/// Create every configured index that does not exist yet
#[inline]
pub async fn init_indexes(ctx: &AppContext) -> Result<()> {
    let dimension = ctx.embedder.dimension();
    for kind in IndexKind::ALL {
        let name = ctx.index_name(kind);
        ctx.store
            .ensure_index(name, dimension)
            .await
            .with_context(|| format!("Failed to create index {}", name))?;
        println!("✅ {} (dimension {}, cosine)", name, dimension);
    }
    Ok(())
}

#[inline]
pub async fn index_datasets(ctx: &AppContext, root: &Path, strategy: IndexStrategy) -> Result<()> {
    ctx.embedder
        .health_check()
        .context("Ollama is not reachable; start it or run 'scholar-rag config'")?;

    let index = ctx.index_name(strategy.kind());
    info!("Indexing {} into {} ({})", root.display(), index, strategy);

    let indexer = Indexer::new(
        Arc::clone(&ctx.embedder) as Arc<dyn Embedder>,
        Arc::clone(&ctx.store),
        ctx.config.chunking.clone(),
    )?
    .with_progress(true);
    let summary = indexer.index_root(root, strategy, index).await?;

    println!("Indexing into {} finished:", style(index).cyan());
    println!("  Datasets: {}", summary.datasets);
    println!("  Papers indexed: {}", summary.papers_indexed);
    println!("  Papers skipped: {}", summary.papers_skipped);
    println!("  Records stored: {}", summary.report.upserted);
    if !summary.report.is_clean() {
        println!(
            "  {} {} batches ({} records) failed, see the log for details",
            style("⚠").yellow(),
            summary.report.failed_batches,
            summary.report.failed_records
        );
    }

    Ok(())
}

/// Answer a single recommendation query and exit
#[inline]
pub async fn ask(ctx: &AppContext, query: &str) -> Result<()> {
    let controller = ctx.controller()?;
    let mut session = Session::new();

    let outcome = controller.handle_turn(&mut session, query).await;
    println!("{}", outcome.answer());

    if let TurnOutcome::Recommended { papers, .. } = &outcome {
        println!();
        println!("{}", style("Retrieved papers:").bold());
        for paper in papers {
            println!(
                "  {:.3}  {}  {}",
                paper.score,
                paper.title,
                style(&paper.abstract_url).dim()
            );
        }
    }

    Ok(())
}

#[inline]
pub async fn chat(ctx: &AppContext) -> Result<()> {
    let controller = ctx.controller()?;
    run_chat(&controller).await
}

/// Report which services and indexes are reachable
#[inline]
pub async fn show_status(ctx: &AppContext) -> Result<()> {
    println!("{}", style("Scholar RAG Status").bold().cyan());
    println!();

    match ctx.embedder.health_check() {
        Ok(()) => println!("  Ollama: {} ({})", style("ok").green(), ctx.embedder.model()),
        Err(e) => {
            warn!("Ollama health check failed: {:#}", e);
            println!("  Ollama: {}", style("unreachable").red());
        }
    }

    println!(
        "  Chat model: {}",
        if ctx.config.gpt_api_key().is_ok() {
            style(ctx.config.language_model.model.as_str()).green()
        } else {
            style("GPT_API_KEY missing").red()
        }
    );

    println!();
    println!(
        "{} ({})",
        style("Indexes").bold().yellow(),
        ctx.config.vector_store.backend
    );
    let existing = match ctx.store.list_indexes().await {
        Ok(names) => names,
        Err(e) => {
            println!("  {} {}", style("Could not list indexes:").red(), e);
            return Ok(());
        }
    };
    for kind in IndexKind::ALL {
        let name = ctx.index_name(kind);
        if existing.iter().any(|existing| existing == name) {
            match ctx.store.count(name).await {
                Ok(records) => println!("  {} {} ({} records)", style("✓").green(), name, records),
                Err(e) => {
                    warn!("Could not count records in {}: {}", name, e);
                    println!("  {} {}", style("✓").green(), name);
                }
            }
        } else {
            println!(
                "  {} {} (missing, run 'scholar-rag init')",
                style("✗").red(),
                name
            );
        }
    }

    Ok(())
}
