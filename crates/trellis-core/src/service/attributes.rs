use std::sync::Arc;

use super::{next_position, AttributeUpdate, NewAttribute, NoteService};
use crate::becca::BeccaSnapshot;
use crate::entities::{Attribute, EntityName, EntityRow};
use crate::error::{StructuralViolation, TrellisError, TrellisResult};
use crate::store::RowStore;
use crate::utils::{new_entity_id, utc_now};

fn validate_name(name: &str) -> Result<(), StructuralViolation> {
    if name.is_empty() {
        return Err(StructuralViolation::invalid("attribute name", "must not be empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(StructuralViolation::invalid(
            "attribute name",
            format!("{:?} contains whitespace", name),
        ));
    }
    Ok(())
}

fn validate_target(snapshot: &BeccaSnapshot, attribute: &Attribute) -> Result<(), StructuralViolation> {
    match attribute.target_note_id() {
        Some(target) if !snapshot.has_note(target) => {
            Err(StructuralViolation::MissingNote(target.to_string()))
        }
        _ => Ok(()),
    }
}

impl<S: RowStore> NoteService<S> {
    fn find_attribute(&self, attribute_id: &str) -> TrellisResult<Arc<Attribute>> {
        self.snapshot()?
            .attribute(attribute_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Attributes, attribute_id))
    }

    /// Add a label or relation to a note. Relations must point at an existing note.
    pub fn create_attribute(&self, new: NewAttribute) -> TrellisResult<Arc<Attribute>> {
        let attribute_id = self.mutate(|snapshot, writes| {
            if !snapshot.has_note(&new.note_id) {
                return Err(StructuralViolation::MissingNote(new.note_id.clone()).into());
            }
            validate_name(&new.name)?;
            let attribute_id = new.attribute_id.clone().unwrap_or_else(new_entity_id);
            if snapshot.attribute(&attribute_id).is_some() {
                return Err(StructuralViolation::DuplicateId {
                    entity: EntityName::Attributes,
                    id: attribute_id,
                }
                .into());
            }

            let attribute = Attribute {
                attribute_id: attribute_id.clone(),
                note_id: new.note_id.clone(),
                attribute_type: new.attribute_type,
                name: new.name.clone(),
                value: new.value.clone(),
                position: new.position.unwrap_or_else(|| {
                    next_position(
                        snapshot
                            .own_attributes(&new.note_id)
                            .iter()
                            .map(|a| a.position),
                    )
                }),
                is_inheritable: new.is_inheritable,
                is_deleted: false,
                utc_date_modified: utc_now(),
            };
            validate_target(snapshot, &attribute)?;
            writes.put(EntityRow::Attribute(attribute));
            Ok(attribute_id)
        })?;
        self.find_attribute(&attribute_id)
    }

    pub fn update_attribute(
        &self,
        attribute_id: &str,
        update: AttributeUpdate,
    ) -> TrellisResult<Arc<Attribute>> {
        self.mutate(|snapshot, writes| {
            let current = snapshot
                .attribute(attribute_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Attributes, attribute_id))?;
            let mut row = Attribute::clone(&current);
            if let Some(value) = &update.value {
                row.value = value.clone();
            }
            if let Some(position) = update.position {
                row.position = position;
            }
            if let Some(inheritable) = update.is_inheritable {
                row.is_inheritable = inheritable;
            }
            if row == *current {
                return Ok(());
            }
            validate_target(snapshot, &row)?;
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Attribute(row));
            Ok(())
        })?;
        self.find_attribute(attribute_id)
    }

    pub fn delete_attribute(&self, attribute_id: &str) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            let current = snapshot
                .attribute(attribute_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Attributes, attribute_id))?;
            let mut row = Attribute::clone(&current);
            row.is_deleted = true;
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Attribute(row));
            Ok(())
        })
    }
}
