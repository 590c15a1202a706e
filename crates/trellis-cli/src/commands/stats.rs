use anyhow::Result;
use serde_json::json;
use trellis_config::TrellisConfig;

use super::open_service;
use crate::cli::OutputFormat;

pub async fn execute(config: &TrellisConfig, format: OutputFormat) -> Result<String> {
    let service = open_service(config).await?;
    let stats = service.snapshot()?.stats();
    let storage = service.store().storage_stats()?;

    let out = match format {
        OutputFormat::Json => {
            let value = json!({
                "notes": stats.notes,
                "branches": stats.branches,
                "attributes": stats.attributes,
                "revisions": stats.revisions,
                "attachments": stats.attachments,
                "options": stats.options,
                "protectedNotes": stats.protected_notes,
                "lockedNotes": stats.locked_notes,
                "blobs": storage.blobs,
                "blobBytes": storage.blob_bytes,
                "pendingChanges": storage.pending_changes,
                "databaseBytes": storage.database_bytes,
                "reclaimableBytes": storage.reclaimable_bytes,
                "schemaVersion": storage.schema_version,
            });
            format!("{}\n", serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Table => {
            let rows = [
                ("notes", stats.notes as u64),
                ("branches", stats.branches as u64),
                ("attributes", stats.attributes as u64),
                ("revisions", stats.revisions as u64),
                ("attachments", stats.attachments as u64),
                ("options", stats.options as u64),
                ("protected notes", stats.protected_notes as u64),
                ("blobs", storage.blobs),
                ("pending changes", storage.pending_changes),
                ("database bytes", storage.database_bytes),
                ("reclaimable bytes", storage.reclaimable_bytes),
            ];
            let mut out = String::from("Note graph statistics\n\n");
            for (label, value) in rows {
                out.push_str(&format!("{:<18}{:>10}\n", label, value));
            }
            out.push_str(&format!("\nDatabase: {}\n", config.storage.path.display()));
            out
        }
    };
    Ok(out)
}
