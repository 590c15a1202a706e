//! Read-only views of the graph

use anyhow::Result;
use serde_json::json;
use std::fmt::Write;
use trellis_config::TrellisConfig;
use trellis_core::{BeccaSnapshot, EntityName, TrellisError};

use super::open_service;
use crate::cli::OutputFormat;

fn title_of(snapshot: &BeccaSnapshot, note_id: &str) -> String {
    snapshot
        .note(note_id)
        .map_or_else(|| note_id.to_string(), |n| n.display_title(None).to_string())
}

fn require_note(snapshot: &BeccaSnapshot, note_id: &str) -> Result<()> {
    if snapshot.has_note(note_id) {
        Ok(())
    } else {
        Err(TrellisError::NotFound {
            entity: EntityName::Notes,
            id: note_id.to_string(),
        }
        .into())
    }
}

fn write_children(
    snapshot: &BeccaSnapshot,
    note_id: &str,
    level: usize,
    depth: Option<usize>,
    out: &mut String,
) {
    if depth.is_some_and(|max| level >= max) {
        return;
    }
    for branch in snapshot.child_branches(note_id) {
        let prefix = branch
            .prefix
            .as_deref()
            .map(|p| format!("{} - ", p))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{}{}{} ({})",
            "  ".repeat(level + 1),
            prefix,
            title_of(snapshot, &branch.note_id),
            branch.note_id
        );
        write_children(snapshot, &branch.note_id, level + 1, depth, out);
    }
}

/// Indented tree below `note_id`, siblings in position order
pub fn render_tree(snapshot: &BeccaSnapshot, note_id: &str, depth: Option<usize>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", title_of(snapshot, note_id), note_id);
    write_children(snapshot, note_id, 0, depth, &mut out);
    out
}

pub async fn tree(
    config: &TrellisConfig,
    note_id: &str,
    depth: Option<usize>,
) -> Result<String> {
    let snapshot = open_service(config).await?.snapshot()?;
    require_note(&snapshot, note_id)?;
    Ok(render_tree(&snapshot, note_id, depth))
}

fn render_path(snapshot: &BeccaSnapshot, path: &[String]) -> String {
    path.iter()
        .map(|id| title_of(snapshot, id))
        .collect::<Vec<_>>()
        .join(" / ")
}

pub async fn path(
    config: &TrellisConfig,
    note_id: &str,
    hoisted: &str,
    all: bool,
) -> Result<String> {
    let snapshot = open_service(config).await?.snapshot()?;
    require_note(&snapshot, note_id)?;

    let mut out = String::new();
    if all {
        for path in snapshot.all_note_paths(note_id) {
            let _ = writeln!(out, "{}", render_path(&snapshot, &path));
        }
    } else {
        match snapshot.note_path(note_id, hoisted) {
            Some(path) => {
                let _ = writeln!(out, "{}", render_path(&snapshot, &path));
            }
            None => {
                let _ = writeln!(out, "{} is not reachable from {}", note_id, hoisted);
            }
        }
    }
    Ok(out)
}

/// Effective attributes of a note with the note each one comes from
pub fn render_attributes(
    snapshot: &BeccaSnapshot,
    note_id: &str,
    name: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let attributes = snapshot.inherited_attributes(note_id, name);
    let out = match format {
        OutputFormat::Json => {
            let values: Vec<_> = attributes
                .iter()
                .map(|a| {
                    json!({
                        "attributeId": a.attribute_id,
                        "type": a.attribute_type,
                        "name": a.name,
                        "value": a.value,
                        "ownerId": a.note_id,
                        "inherited": a.note_id != note_id,
                    })
                })
                .collect();
            format!("{}\n", serde_json::to_string_pretty(&values)?)
        }
        OutputFormat::Table => {
            let mut out = String::new();
            for a in &attributes {
                let sigil = if a.is_label() { '#' } else { '~' };
                let _ = write!(out, "{}{}", sigil, a.name);
                if !a.value.is_empty() {
                    let _ = write!(out, "={}", a.value);
                }
                if a.note_id != note_id {
                    let _ = write!(out, "  (from {})", title_of(snapshot, &a.note_id));
                }
                out.push('\n');
            }
            out
        }
    };
    Ok(out)
}

pub async fn attributes(
    config: &TrellisConfig,
    note_id: &str,
    name: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let snapshot = open_service(config).await?.snapshot()?;
    require_note(&snapshot, note_id)?;
    render_attributes(&snapshot, note_id, name, format)
}
