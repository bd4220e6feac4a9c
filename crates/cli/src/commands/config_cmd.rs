//! `docsage config`: configuration management commands.

use std::path::Path;

use anyhow::{Context, bail};
use clap::Subcommand;
use docsage_config::{AppConfig, IndexBackend};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Parse and validate the configuration
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(action: ConfigAction, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);

    match action {
        ConfigAction::Show => {
            let mut config = AppConfig::load_or_default(path)?;
            if config.api_key.is_some() {
                config.api_key = Some("[REDACTED]".into());
            }
            for provider in config.providers.values_mut() {
                if provider.api_key.is_some() {
                    provider.api_key = Some("[REDACTED]".into());
                }
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Validate => validate(path)?,
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Cannot create {}", parent.display()))?;
            }
            tokio::fs::write(&config_path, AppConfig::default_toml())
                .await
                .with_context(|| format!("Cannot write {}", config_path.display()))?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}

fn validate(path: Option<&Path>) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(path).context("Config is invalid")?;
    println!("Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (DOCSAGE_API_KEY or OPENAI_API_KEY)".to_string());
    }
    if config.sources.is_empty() {
        warnings.push("No [[sources]] declared; `docsage ingest` needs explicit paths".to_string());
    }
    if config.index.backend == IndexBackend::Memory && !config.sources.is_empty() {
        warnings.push("Memory index: sources are re-ingested on every run".to_string());
    }
    for source in config.sources.iter().filter(|s| !s.path.exists()) {
        warnings.push(format!(
            "Source '{}' path {} does not exist",
            source.name,
            source.path.display()
        ));
    }

    for warning in &warnings {
        println!("  warning: {warning}");
    }
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Embedder:  {} ({})", config.embedding.provider, config.embedding.model);
    println!("  Index:     {:?}", config.index.backend);
    println!("  Sources:   {}", config.sources.len());
    println!(
        "  Tools:     {}",
        config
            .tools
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
