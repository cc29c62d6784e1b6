use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScholarError>;

#[derive(Error, Debug)]
pub enum ScholarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read document {}: {message}", path.display())]
    DocumentRead { path: PathBuf, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
mod http;
pub mod indexer;
pub mod llm;
pub mod rag;
pub mod retrieval;

#[cfg(test)]
mod testing;
