//! Subcommand implementations
//!
//! Each command renders into a `String` so the output can be tested without a
//! terminal; `execute` prints it.

pub mod changes;
pub mod check;
pub mod init;
pub mod inspect;
pub mod notes;
pub mod purge;
pub mod stats;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;
use trellis_config::TrellisConfig;
use trellis_core::NoteService;
use trellis_sqlite::SqliteRowStore;

use crate::cli::{Commands, OutputFormat};

pub type Service = NoteService<SqliteRowStore>;

/// Open the database named in the config and load the graph
pub async fn open_service(config: &TrellisConfig) -> Result<Service> {
    let store = SqliteRowStore::open(&config.storage)
        .with_context(|| format!("opening {}", config.storage.path.display()))?;
    let service = NoteService::open_incremental(Arc::new(store), config)
        .await
        .context("loading the note graph")?;
    debug!(path = %config.storage.path.display(), "Note service ready");
    Ok(service)
}

/// Run one command and return what it prints
pub async fn run(
    config: &TrellisConfig,
    command: Commands,
    format: OutputFormat,
) -> Result<String> {
    match command {
        Commands::Init { secret_env } => init::execute(config, secret_env.as_deref()).await,
        Commands::Stats => stats::execute(config, format).await,
        Commands::Check => check::execute(config).await,
        Commands::Tree { note, depth } => inspect::tree(config, &note, depth).await,
        Commands::Path { note, hoisted, all } => {
            inspect::path(config, &note, &hoisted, all).await
        }
        Commands::Attributes { note, name } => {
            inspect::attributes(config, &note, name.as_deref(), format).await
        }
        Commands::Changes { since, limit } => {
            changes::execute(config, since, limit, format).await
        }
        Commands::Purge { older_than_days } => purge::execute(config, older_than_days).await,
        Commands::New {
            parent,
            title,
            content,
        } => notes::create(config, &parent, &title, content.as_deref()).await,
        Commands::Clone { note, parent } => notes::clone(config, &note, &parent).await,
    }
}
