use anyhow::Result;
use trellis_config::TrellisConfig;
use trellis_core::ROOT_NOTE_ID;

use super::open_service;

/// Loading validates the graph; report what it found
pub async fn execute(config: &TrellisConfig) -> Result<String> {
    let service = open_service(config).await?;
    let snapshot = service.snapshot()?;
    let stats = snapshot.stats();

    let mut out = String::new();
    if !snapshot.has_note(ROOT_NOTE_ID) {
        out.push_str("warning: no root note (run `trellis init`)\n");
    }
    let unreachable = snapshot
        .notes()
        .filter(|note| !note.is_root() && snapshot.note_path(&note.note_id, ROOT_NOTE_ID).is_none())
        .count();
    if unreachable > 0 {
        out.push_str(&format!("warning: {} notes are not reachable from the root\n", unreachable));
    }
    out.push_str(&format!(
        "OK: {} notes, {} branches, {} attributes\n",
        stats.notes, stats.branches, stats.attributes
    ));
    Ok(out)
}
