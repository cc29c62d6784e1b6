
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, EmbeddingConfig, VectorBackend, VectorStoreConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Scholar RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance that serves the sentence-embedding model.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Vector Store Configuration").bold().yellow());
    configure_vector_store(&mut config.vector_store)?;

    eprintln!();
    eprintln!("{}", style("Language Model Configuration").bold().yellow());
    let model: String = Input::new()
        .with_prompt("Chat completion model")
        .default(config.language_model.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    config.language_model.set_model(model)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.embedding) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before indexing or chatting.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.embedding.host).cyan());
    eprintln!("  Port: {}", style(config.embedding.port).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.embedding.embedding_dimension).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Vector Store Settings:").bold().yellow());
    let store = &config.vector_store;
    eprintln!("  Backend: {}", style(store.backend).cyan());
    if store.backend == VectorBackend::Pinecone {
        eprintln!("  Cloud/Region: {}/{}", style(&store.cloud).cyan(), style(&store.region).cyan());
    } else {
        eprintln!(
            "  Path: {}",
            style(config.vector_database_path().display()).cyan()
        );
    }
    eprintln!("  Contents Index: {}", style(&store.contents_index).cyan());
    eprintln!("  Sections Index: {}", style(&store.sections_index).cyan());
    eprintln!("  Abstracts Index: {}", style(&store.abstracts_index).cyan());
    eprintln!("  Upsert Batch Size: {}", style(store.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Language Model Settings:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.language_model.base_url).cyan());
    eprintln!("  Model: {}", style(&config.language_model.model).cyan());
    eprintln!(
        "  Temperature: {}",
        style(config.language_model.temperature).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Credentials:").bold().yellow());
    eprintln!("  GPT_API_KEY: {}", secret_status(config.gpt_api_key().is_ok()));
    eprintln!(
        "  PINECONE_API_KEY: {}",
        secret_status(config.pinecone_api_key().is_ok())
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn secret_status(present: bool) -> console::StyledObject<&'static str> {
    if present {
        style("set").green()
    } else {
        style("missing").red()
    }
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embedding.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(embedding.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.set_protocol(protocol)?;
    embedding.set_host(host)?;
    embedding.set_port(port)?;
    embedding.set_model(model)?;

    Ok(())
}

fn configure_vector_store(store: &mut VectorStoreConfig) -> Result<()> {
    let backends = &["pinecone", "lance"];
    let default_index = usize::from(store.backend == VectorBackend::Lance);

    let backend_index = Select::new()
        .with_prompt("Vector store backend")
        .default(default_index)
        .items(backends)
        .interact()?;

    store.backend = if backend_index == 0 {
        VectorBackend::Pinecone
    } else {
        VectorBackend::Lance
    };

    if store.backend == VectorBackend::Pinecone {
        let region: String = Input::new()
            .with_prompt("Pinecone serverless region (PINECONE_ENV overrides this)")
            .default(store.region.clone())
            .interact_text()?;
        store.set_region(region)?;
    }

    Ok(())
}

fn test_ollama_connection(embedding: &EmbeddingConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        embedding.protocol, embedding.host, embedding.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
