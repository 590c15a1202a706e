use anyhow::{bail, Context, Result};
use tracing::info;
use trellis_config::TrellisConfig;

use super::open_service;

pub async fn execute(config: &TrellisConfig, secret_env: Option<&str>) -> Result<String> {
    let service = open_service(config).await?;
    service.ensure_root()?;
    let mut out = format!("Database ready at {}\n", config.storage.path.display());

    if let Some(var) = secret_env {
        if service.is_protection_initialized()? {
            bail!("protected sessions are already set up for this database");
        }
        let secret = std::env::var(var)
            .with_context(|| format!("reading the secret from ${}", var))?;
        if secret.is_empty() {
            bail!("${} is empty", var);
        }
        service.initialize_protection(&secret)?;
        info!("Protected sessions initialized from ${}", var);
        out.push_str("Protected sessions initialized\n");
    }
    Ok(out)
}
