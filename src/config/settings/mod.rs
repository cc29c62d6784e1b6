
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

pub const GPT_API_KEY_VAR: &str = "GPT_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const PINECONE_ENV_VAR: &str = "PINECONE_ENV";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub language_model: LanguageModelConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub secrets: Secrets,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "all-minilm".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Hosted Pinecone indexes
    Pinecone,
    /// Local LanceDB tables under the config directory
    Lance,
}

impl fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pinecone => write!(f, "pinecone"),
            Self::Lance => write!(f, "lance"),
        }
    }
}

/// The three logical datasets, each held in its own named index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Full-text chunks, looked up by title for follow-up questions
    Contents,
    /// Chunks labelled with the paper section they came from
    Sections,
    /// One record per paper carrying its abstract and catalog metadata
    Abstracts,
}

impl IndexKind {
    pub const ALL: [Self; 3] = [Self::Contents, Self::Sections, Self::Abstracts];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub controller_url: String,
    pub api_version: String,
    pub cloud: String,
    pub region: String,
    pub dimension: u32,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub contents_index: String,
    pub sections_index: String,
    pub abstracts_index: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Pinecone,
            controller_url: "https://api.pinecone.io".to_string(),
            api_version: "2024-07".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 50,
            timeout_secs: 30,
            contents_index: "paper-contents".to_string(),
            sections_index: "research-sections".to_string(),
            abstracts_index: "research-abstracts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguageModelConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Papers retrieved per recommendation
    pub top_k: usize,
    /// Maximum chunks fetched per title for the follow-up cache
    pub title_lookup_limit: usize,
    /// Chat turns rendered into follow-up prompts
    pub history_window: usize,
    /// Estimated-token ceiling for the follow-up context
    pub max_context_tokens: usize,
    /// Characters kept per allowed token when the context is truncated
    pub context_chars_per_token: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            title_lookup_limit: 100,
            history_window: 5,
            max_context_tokens: 3000,
            context_chars_per_token: 4,
        }
    }
}

/// Credentials read from the environment, never written to disk
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub gpt_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_env: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("Secrets")
            .field("gpt_api_key", &redact(&self.gpt_api_key))
            .field("pinecone_api_key", &redact(&self.pinecone_api_key))
            .field("pinecone_env", &self.pinecone_env)
            .finish()
    }
}

impl Secrets {
    #[inline]
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            gpt_api_key: read(GPT_API_KEY_VAR),
            pinecone_api_key: read(PINECONE_API_KEY_VAR),
            pinecone_env: read(PINECONE_ENV_VAR),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidUpsertBatchSize(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid region: {0:?} (cannot be empty)")]
    InvalidRegion(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Embedding dimension ({0}) does not match index dimension ({1})")]
    DimensionMismatch(u32, u32),
    #[error("Invalid index name: {0:?} (lowercase letters, digits and '-' only)")]
    InvalidIndexName(String),
    #[error("Index names must be distinct, {0:?} is used twice")]
    DuplicateIndexName(String),
    #[error("Invalid chunk size: {0} (must be between 1 and 10000 words)")]
    InvalidChunkSize(usize),
    #[error("Overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be between 1 and 128000)")]
    InvalidMaxTokens(u32),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid title lookup limit: {0} (must be between 1 and 10000)")]
    InvalidTitleLookupLimit(usize),
    #[error("Invalid history window: {0} (must be at least 1)")]
    InvalidHistoryWindow(usize),
    #[error("Invalid context budget: {0} tokens (must be at least 1)")]
    InvalidContextBudget(usize),
    #[error("Missing environment variable {0}")]
    MissingSecret(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory (`<platform config dir>/scholar-rag`)
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("scholar-rag"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults, then
    /// apply credentials from the environment
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;
        config.apply_secrets(Secrets::from_env());
        Ok(config)
    }

    /// Load `config.toml` without consulting the environment
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Install credentials; `PINECONE_ENV` overrides the configured region
    #[inline]
    pub fn apply_secrets(&mut self, secrets: Secrets) {
        if let Some(region) = &secrets.pinecone_env {
            self.vector_store.region = region.clone();
        }
        self.secrets = secrets;
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the local LanceDB directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.embedding.ollama_url()
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.vector_store.validate()?;
        self.language_model.validate()?;
        self.validate_chunking_config()?;
        self.retrieval.validate()?;

        if self.embedding.embedding_dimension != self.vector_store.dimension {
            return Err(ConfigError::DimensionMismatch(
                self.embedding.embedding_dimension,
                self.vector_store.dimension,
            ));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(1..=10_000).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    /// API key for the chat completion endpoint
    #[inline]
    pub fn gpt_api_key(&self) -> Result<&str, ConfigError> {
        self.secrets
            .gpt_api_key
            .as_deref()
            .ok_or(ConfigError::MissingSecret(GPT_API_KEY_VAR))
    }

    /// API key for the hosted vector store
    #[inline]
    pub fn pinecone_api_key(&self) -> Result<&str, ConfigError> {
        self.secrets
            .pinecone_api_key
            .as_deref()
            .ok_or(ConfigError::MissingSecret(PINECONE_API_KEY_VAR))
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.controller_url)
            .map_err(|_| ConfigError::InvalidUrl(self.controller_url.clone()))?;

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidUpsertBatchSize(self.batch_size));
        }

        let names = [
            &self.contents_index,
            &self.sections_index,
            &self.abstracts_index,
        ];
        for name in names {
            let valid = !name.is_empty()
                && name.len() <= 45
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid {
                return Err(ConfigError::InvalidIndexName(name.clone()));
            }
        }
        for (i, name) in names.iter().enumerate() {
            if names[i + 1..].contains(name) {
                return Err(ConfigError::DuplicateIndexName((*name).clone()));
            }
        }

        Ok(())
    }

    /// Canonical index name for a dataset
    #[inline]
    pub fn index_name(&self, kind: IndexKind) -> &str {
        match kind {
            IndexKind::Contents => &self.contents_index,
            IndexKind::Sections => &self.sections_index,
            IndexKind::Abstracts => &self.abstracts_index,
        }
    }

    pub fn set_region(&mut self, region: String) -> Result<(), ConfigError> {
        if region.trim().is_empty() {
            return Err(ConfigError::InvalidRegion(region));
        }
        self.region = region;
        Ok(())
    }
}

impl LanguageModelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=128_000).contains(&self.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if !(1..=10_000).contains(&self.title_lookup_limit) {
            return Err(ConfigError::InvalidTitleLookupLimit(
                self.title_lookup_limit,
            ));
        }

        if self.history_window == 0 {
            return Err(ConfigError::InvalidHistoryWindow(self.history_window));
        }

        if self.max_context_tokens == 0 || self.context_chars_per_token == 0 {
            return Err(ConfigError::InvalidContextBudget(self.max_context_tokens));
        }

        Ok(())
    }

    /// Character length the follow-up context is cut to once it exceeds the token budget
    #[inline]
    pub fn context_char_limit(&self) -> usize {
        self.max_context_tokens
            .saturating_mul(self.context_chars_per_token)
    }
}
