//! Small writes for scripting and smoke tests

use anyhow::Result;
use trellis_config::TrellisConfig;
use trellis_core::{NewBranch, NewNote};

use super::open_service;

pub async fn create(
    config: &TrellisConfig,
    parent: &str,
    title: &str,
    content: Option<&str>,
) -> Result<String> {
    let service = open_service(config).await?;
    let mut new = NewNote::new(parent, title);
    if let Some(content) = content {
        new = new.with_content(content);
    }
    let (note, branch) = service.create_note(new, None)?;
    Ok(format!("{} (branch {})\n", note.note_id, branch.branch_id))
}

pub async fn clone(config: &TrellisConfig, note_id: &str, parent: &str) -> Result<String> {
    let service = open_service(config).await?;
    let branch = service.create_branch(NewBranch::new(note_id, parent))?;
    Ok(format!("{}\n", branch.branch_id))
}
