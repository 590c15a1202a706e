use anyhow::Result;
use clap::Parser;
use tracing::debug;

use trellis_cli::{cli::Cli, commands, logging};
use trellis_config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration with CLI overrides
    let mut config = ConfigLoader::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.storage.path = db.clone();
    }
    logging::init(&config.logging, cli.requested_level());
    debug!(command = ?cli.command, "Starting");

    let output = commands::run(&config, cli.command, cli.format).await?;
    print!("{}", output);
    Ok(())
}
