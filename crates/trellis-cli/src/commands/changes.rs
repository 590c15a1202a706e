use anyhow::Result;
use std::fmt::Write;
use trellis_config::TrellisConfig;
use trellis_core::EntityChange;

use super::open_service;
use crate::cli::OutputFormat;

pub fn render(changes: &[EntityChange], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(changes)?));
    }
    let mut out = String::new();
    for c in changes {
        let kind = if c.is_erased { "erased" } else { "upsert" };
        let synced = if c.is_synced { "" } else { "  *pending" };
        let _ = writeln!(
            out,
            "{:>6}  {}  {:<11} {:<24} {}  {}{}",
            c.id,
            c.utc_date_changed,
            c.entity_name,
            c.entity_id,
            kind,
            &c.hash[..c.hash.len().min(12)],
            synced
        );
    }
    Ok(out)
}

pub async fn execute(
    config: &TrellisConfig,
    since: i64,
    limit: usize,
    format: OutputFormat,
) -> Result<String> {
    let service = open_service(config).await?;
    render(&service.changes_since(since, limit)?, format)
}
