use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unknown enum text read from the store or a replica
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

/// Entity kinds tracked by the change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityName {
    Notes,
    Branches,
    Attributes,
    Revisions,
    Attachments,
    Blobs,
    Options,
}

impl EntityName {
    pub const ALL: [EntityName; 7] = [
        EntityName::Options,
        EntityName::Notes,
        EntityName::Branches,
        EntityName::Attributes,
        EntityName::Revisions,
        EntityName::Attachments,
        EntityName::Blobs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityName::Notes => "notes",
            EntityName::Branches => "branches",
            EntityName::Attributes => "attributes",
            EntityName::Revisions => "revisions",
            EntityName::Attachments => "attachments",
            EntityName::Blobs => "blobs",
            EntityName::Options => "options",
        }
    }

    /// Kinds that are flagged deleted before they are erased
    pub fn is_soft_deletable(&self) -> bool {
        matches!(
            self,
            EntityName::Notes
                | EntityName::Branches
                | EntityName::Attributes
                | EntityName::Attachments
        )
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityName {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ParseKindError {
                kind: "entity name",
                value: s.to_string(),
            })
    }
}

/// Note types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteType {
    #[default]
    Text,
    Code,
    File,
    Image,
    Search,
    Book,
    RelationMap,
    Render,
    Canvas,
    Mermaid,
    WebView,
    MindMap,
    ContentWidget,
    NoteMap,
    Launcher,
    Doc,
}

impl NoteType {
    const ALL: [NoteType; 16] = [
        NoteType::Text,
        NoteType::Code,
        NoteType::File,
        NoteType::Image,
        NoteType::Search,
        NoteType::Book,
        NoteType::RelationMap,
        NoteType::Render,
        NoteType::Canvas,
        NoteType::Mermaid,
        NoteType::WebView,
        NoteType::MindMap,
        NoteType::ContentWidget,
        NoteType::NoteMap,
        NoteType::Launcher,
        NoteType::Doc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Text => "text",
            NoteType::Code => "code",
            NoteType::File => "file",
            NoteType::Image => "image",
            NoteType::Search => "search",
            NoteType::Book => "book",
            NoteType::RelationMap => "relationMap",
            NoteType::Render => "render",
            NoteType::Canvas => "canvas",
            NoteType::Mermaid => "mermaid",
            NoteType::WebView => "webView",
            NoteType::MindMap => "mindMap",
            NoteType::ContentWidget => "contentWidget",
            NoteType::NoteMap => "noteMap",
            NoteType::Launcher => "launcher",
            NoteType::Doc => "doc",
        }
    }

    /// Mime used when a note is created without one
    pub fn default_mime(&self) -> &'static str {
        match self {
            NoteType::Text | NoteType::Book => "text/html",
            NoteType::Code => "text/plain",
            NoteType::Mermaid => "text/mermaid",
            NoteType::Canvas
            | NoteType::MindMap
            | NoteType::RelationMap
            | NoteType::Search
            | NoteType::NoteMap => "application/json",
            _ => "",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NoteType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseKindError {
                kind: "note type",
                value: s.to_string(),
            })
    }
}

/// The two attribute kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Key/value tag
    Label,
    /// Typed edge; the value holds the target note id
    Relation,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Label => "label",
            AttributeType::Relation => "relation",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label" => Ok(AttributeType::Label),
            "relation" => Ok(AttributeType::Relation),
            other => Err(ParseKindError {
                kind: "attribute type",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_type_text_matches_serde() {
        for t in NoteType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<NoteType>().unwrap(), t);
        }
    }

    #[test]
    fn test_entity_name_parse() {
        assert_eq!("branches".parse::<EntityName>().unwrap(), EntityName::Branches);
        assert!("widgets".parse::<EntityName>().is_err());
    }

    #[test]
    fn test_attribute_type_parse() {
        assert_eq!("relation".parse::<AttributeType>().unwrap(), AttributeType::Relation);
        let err = "edge".parse::<AttributeType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown attribute type: edge");
    }
}
