// Configuration management module
// TOML settings on disk plus credentials from the environment

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, IndexKind, LanguageModelConfig, RetrievalConfig,
    Secrets, VectorBackend, VectorStoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
