use anyhow::{ensure, Result};
use trellis_config::TrellisConfig;

use super::open_service;

pub async fn execute(config: &TrellisConfig, older_than_days: i64) -> Result<String> {
    ensure!(older_than_days >= 0, "--older-than-days must not be negative");
    let service = open_service(config).await?;
    let report = service.purge_deleted(chrono::Duration::days(older_than_days))?;
    Ok(format!(
        "Erased {} rows: {} notes, {} branches, {} attributes, {} revisions, {} attachments, {} blobs\n",
        report.total(),
        report.notes,
        report.branches,
        report.attributes,
        report.revisions,
        report.attachments,
        report.blobs
    ))
}
