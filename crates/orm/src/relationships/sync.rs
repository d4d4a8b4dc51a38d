//! Foreign Key Synchronization - keeps both sides of two-way associations in agreement
//!
//! Every write of a persisted owner's foreign key goes through [`ForeignKeySync::replace`],
//! which diffs the old and new references and patches the inverse foreign key on each
//! related record that was added or removed.

use super::metadata::{AssociationDescriptor, ModelRef};
use super::registry::AssociationRegistry;
use crate::db::{Db, Record, RecordId};
use crate::error::ModelResult;

/// Synchronizes foreign keys of stored records
pub struct ForeignKeySync<'a> {
    db: &'a mut Db,
    registry: &'a AssociationRegistry,
}

impl<'a> ForeignKeySync<'a> {
    pub fn new(db: &'a mut Db, registry: &'a AssociationRegistry) -> Self {
        Self { db, registry }
    }

    /// Whether the referenced record is stored
    pub fn exists(&self, model_ref: &ModelRef) -> bool {
        self.record(model_ref).is_some()
    }

    /// References currently stored under `association` on `owner`.
    /// Malformed stored values read as no references.
    pub fn stored_refs(&self, owner: &ModelRef, association: &AssociationDescriptor) -> Vec<ModelRef> {
        let Some(record) = self.record(owner) else {
            return Vec::new();
        };
        let value = record.get(&association.foreign_key).cloned().unwrap_or_default();
        association.refs_from_value(&value).unwrap_or_else(|err| {
            tracing::warn!("Ignoring malformed foreign key on {}: {}", owner, err);
            Vec::new()
        })
    }

    /// Replace the references of a persisted owner and update every inverse
    pub fn replace(
        &mut self,
        owner: &ModelRef,
        association: &AssociationDescriptor,
        refs: &[ModelRef],
    ) -> ModelResult<()> {
        let old = self.stored_refs(owner, association);
        let new = dedupe(refs);
        self.write_refs(owner, association, &new)?;
        self.reconcile(owner, association, &old, &new)
    }

    /// Apply the inverse side of an `old -> new` change on `owner`
    pub fn reconcile(
        &mut self,
        owner: &ModelRef,
        association: &AssociationDescriptor,
        old: &[ModelRef],
        new: &[ModelRef],
    ) -> ModelResult<()> {
        if !association.has_inverse() {
            return Ok(());
        }

        let registry = self.registry;
        for removed in old.iter().filter(|r| !new.contains(r)) {
            if let Some(inverse) = registry.inverse_of(association, &removed.model) {
                self.unlink(removed, inverse, owner)?;
            }
        }
        for added in new.iter().filter(|r| !old.contains(r)) {
            if let Some(inverse) = registry.inverse_of(association, &added.model) {
                self.link(added, inverse, owner)?;
            }
        }
        Ok(())
    }

    /// Remove every reference to a destroyed record. Returns how many
    /// records were rewritten.
    pub fn cascade_destroy(&mut self, destroyed: &ModelRef) -> ModelResult<usize> {
        let registry = self.registry;
        let mut touched = 0;
        for association in registry.dependents_of(&destroyed.model) {
            let collection = registry.collection_name(&association.owner)?;
            let Ok(records) = self.db.collection(collection) else {
                continue;
            };

            let mut rewrites: Vec<(RecordId, Vec<ModelRef>)> = Vec::new();
            for record in records.records() {
                let Some(value) = record.get(&association.foreign_key) else {
                    continue;
                };
                let Ok(refs) = association.refs_from_value(value) else {
                    continue;
                };
                if refs.contains(destroyed) {
                    if let Some(id) = RecordId::of(record) {
                        rewrites.push((id, refs.into_iter().filter(|r| r != destroyed).collect()));
                    }
                }
            }

            for (id, refs) in rewrites {
                let owner = ModelRef::new(association.owner.clone(), id);
                self.write_refs(&owner, association, &refs)?;
                touched += 1;
            }
        }

        tracing::debug!("Destroyed {}, removed references from {} record(s)", destroyed, touched);
        Ok(touched)
    }

    /// Add `owner` to `association` on `target`
    fn link(&mut self, target: &ModelRef, association: &AssociationDescriptor, owner: &ModelRef) -> ModelResult<()> {
        if !self.exists(target) {
            tracing::trace!("Skipping link of missing {}", target);
            return Ok(());
        }

        let mut current = self.stored_refs(target, association);
        if current.contains(owner) {
            return Ok(());
        }

        if association.is_has_many() {
            current.push(owner.clone());
            return self.write_refs(target, association, &current);
        }

        self.write_refs(target, association, std::slice::from_ref(owner))?;
        // the target's previous partner no longer points back at it
        let registry = self.registry;
        if let Some(previous) = current.first() {
            if let Some(back) = registry.inverse_of(association, &previous.model) {
                self.unlink(previous, back, target)?;
            }
        }
        Ok(())
    }

    /// Remove `owner` from `association` on `target`
    fn unlink(&mut self, target: &ModelRef, association: &AssociationDescriptor, owner: &ModelRef) -> ModelResult<()> {
        let current = self.stored_refs(target, association);
        if !current.contains(owner) {
            return Ok(());
        }
        let remaining: Vec<ModelRef> = current.into_iter().filter(|r| r != owner).collect();
        self.write_refs(target, association, &remaining)
    }

    fn write_refs(&mut self, owner: &ModelRef, association: &AssociationDescriptor, refs: &[ModelRef]) -> ModelResult<()> {
        let collection = self.registry.collection_name(&owner.model)?;
        let value = association.value_from_refs(refs);
        tracing::trace!("{}.{} = {}", owner, association.foreign_key, value);
        self.db
            .collection_mut(collection)?
            .set_attr(&owner.id, &association.foreign_key, value);
        Ok(())
    }

    fn record(&self, model_ref: &ModelRef) -> Option<&Record> {
        let collection = self.registry.collection_name(&model_ref.model).ok()?;
        let records = self.db.collection(collection).ok()?.records();
        records.iter().find(|r| RecordId::of(r).as_ref() == Some(&model_ref.id))
    }
}

fn dedupe(refs: &[ModelRef]) -> Vec<ModelRef> {
    let mut unique: Vec<ModelRef> = Vec::with_capacity(refs.len());
    for model_ref in refs {
        if !unique.contains(model_ref) {
            unique.push(model_ref.clone());
        }
    }
    unique
}
