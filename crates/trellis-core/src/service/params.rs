//! Inputs of the mutation operations

use crate::entities::{AttributeType, NoteType};

/// A note to create under an existing parent
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub parent_note_id: String,
    pub title: String,
    pub note_type: NoteType,
    /// Defaults to the note type's mime
    pub mime: Option<String>,
    pub content: Vec<u8>,
    /// Generated when absent
    pub note_id: Option<String>,
    /// Appended after the last sibling when absent
    pub position: Option<i64>,
    pub prefix: Option<String>,
    /// Notes under a protected parent are always protected
    pub is_protected: bool,
}

impl NewNote {
    pub fn new(parent_note_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            parent_note_id: parent_note_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, note_id: impl Into<String>) -> Self {
        self.note_id = Some(note_id.into());
        self
    }

    pub fn with_type(mut self, note_type: NoteType) -> Self {
        self.note_type = note_type;
        self
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn at_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub note_type: Option<NoteType>,
    pub mime: Option<String>,
}

/// Placement of an existing note under another parent
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub note_id: String,
    pub parent_note_id: String,
    pub position: Option<i64>,
    pub prefix: Option<String>,
    pub is_expanded: bool,
}

impl NewBranch {
    pub fn new(note_id: impl Into<String>, parent_note_id: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            parent_note_id: parent_note_id.into(),
            position: None,
            prefix: None,
            is_expanded: false,
        }
    }

    pub fn at_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BranchUpdate {
    pub note_position: Option<i64>,
    /// `Some(None)` clears the prefix
    pub prefix: Option<Option<String>>,
    pub is_expanded: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewAttribute {
    pub note_id: String,
    pub attribute_type: AttributeType,
    pub name: String,
    pub value: String,
    pub is_inheritable: bool,
    pub position: Option<i64>,
    pub attribute_id: Option<String>,
}

impl NewAttribute {
    pub fn label(
        note_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            note_id: note_id.into(),
            attribute_type: AttributeType::Label,
            name: name.into(),
            value: value.into(),
            is_inheritable: false,
            position: None,
            attribute_id: None,
        }
    }

    pub fn relation(
        note_id: impl Into<String>,
        name: impl Into<String>,
        target_note_id: impl Into<String>,
    ) -> Self {
        Self {
            attribute_type: AttributeType::Relation,
            ..Self::label(note_id, name, target_note_id)
        }
    }

    pub fn inheritable(mut self) -> Self {
        self.is_inheritable = true;
        self
    }

    pub fn with_id(mut self, attribute_id: impl Into<String>) -> Self {
        self.attribute_id = Some(attribute_id.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeUpdate {
    pub value: Option<String>,
    pub position: Option<i64>,
    pub is_inheritable: Option<bool>,
}

/// Attachment of a note or revision
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub owner_id: String,
    pub role: String,
    pub mime: String,
    pub title: String,
    pub content: Vec<u8>,
    pub position: Option<i64>,
}

impl NewAttachment {
    pub fn new(
        owner_id: impl Into<String>,
        role: impl Into<String>,
        mime: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            role: role.into(),
            mime: mime.into(),
            title: title.into(),
            content: content.into(),
            position: None,
        }
    }
}
