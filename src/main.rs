use clap::{Parser, Subcommand};
use scholar_rag::Result;
use scholar_rag::commands::{
    AppContext, ask, chat, index_datasets, init_indexes, resolve_config_dir, show_status,
};
use scholar_rag::config::{Config, run_interactive_config, show_config};
use scholar_rag::indexer::IndexStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scholar-rag")]
#[command(about = "Recommend research papers and answer follow-up questions about them")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and local vector data
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding service, vector store and language model
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the paper, section and abstract indexes if they are missing
    Init,
    /// Index every dataset under a directory of <venue>/<year> folders
    Index {
        /// Dataset root, or a single dataset directory
        root: PathBuf,
        /// What to embed for each paper
        #[arg(long, value_enum, default_value_t = IndexStrategy::FullText)]
        strategy: IndexStrategy,
    },
    /// Ask for paper recommendations once and exit
    Ask {
        /// Natural-language description of the papers you are looking for
        query: String,
    },
    /// Start an interactive chat session
    Chat,
    /// Show service and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Init => {
            init_indexes(&AppContext::load(&config_dir).await?).await?;
        }
        Commands::Index { root, strategy } => {
            index_datasets(&AppContext::load(&config_dir).await?, &root, strategy).await?;
        }
        Commands::Ask { query } => {
            ask(&AppContext::load(&config_dir).await?, &query).await?;
        }
        Commands::Chat => {
            chat(&AppContext::load(&config_dir).await?).await?;
        }
        Commands::Status => {
            show_status(&AppContext::load(&config_dir).await?).await?;
        }
    }

    Ok(())
}
