//! Association reads and writes on model instances
//!
//! Edits on a persisted owner are written through at once, together with
//! the inverse side of every added or removed edge. Edits on an unsaved
//! owner are staged and written by `save()`.

use std::collections::BTreeMap;

use serde_json::Value;

use super::collection::Collection;
use super::instance::{Model, PendingLink};
use crate::db::IntoAttrs;
use crate::error::ModelResult;
use crate::relationships::{AssociationDescriptor, ModelRef};

impl Model {
    /// Every association of this instance's type, keyed by name
    pub fn associations(&self) -> ModelResult<BTreeMap<String, AssociationDescriptor>> {
        self.schema.associations_for(self.model_name())
    }

    pub fn association(&self, name: &str) -> ModelResult<AssociationDescriptor> {
        Ok(self.schema.registry().association(self.model_name(), name)?.clone())
    }

    /// Current foreign key value of an association
    pub fn foreign_key(&self, name: &str) -> ModelResult<Value> {
        let association = self.association(name)?;
        Ok(self
            .attr(&association.foreign_key)
            .unwrap_or_else(|| association.empty_value()))
    }

    /// The related instance of a belongsTo association. Unresolvable
    /// references read as `None`.
    pub fn get_related(&self, name: &str) -> ModelResult<Option<Model>> {
        let association = self.association(name)?;
        if !association.is_belongs_to() {
            return Err(association.mismatch("has many related models, use get_related_many"));
        }

        if let Some(pending) = self.pending_models(name).pop() {
            return Ok(Some(pending));
        }
        match self.current_refs(&association).first() {
            Some(model_ref) => self.schema.find(&model_ref.model, &model_ref.id),
            None => Ok(None),
        }
    }

    /// The related instances of a hasMany association, in stored order.
    /// Ids without a stored record are skipped.
    pub fn get_related_many(&self, name: &str) -> ModelResult<Collection> {
        let association = self.association(name)?;
        if !association.is_has_many() {
            return Err(association.mismatch("has one related model, use get_related"));
        }

        let mut models = Vec::new();
        for model_ref in self.current_refs(&association) {
            if let Some(model) = self.schema.find(&model_ref.model, &model_ref.id)? {
                models.push(model);
            }
        }
        for pending in self.pending_models(name) {
            if !models.iter().any(|m| *m == pending) {
                models.push(pending);
            }
        }

        Ok(match association.target_model() {
            Some(target) => Collection::new(target, models),
            None => Collection::polymorphic(models),
        })
    }

    /// Ids of the stored related records
    pub fn related_ids(&self, name: &str) -> ModelResult<Vec<ModelRef>> {
        let association = self.association(name)?;
        Ok(self.current_refs(&association))
    }

    /// Point a belongsTo association at `related`, or clear it
    pub fn set_related(&self, name: &str, related: Option<&Model>) -> ModelResult<()> {
        let association = self.association(name)?;
        if !association.is_belongs_to() {
            return Err(association.mismatch("expected a list of models"));
        }
        let related: Vec<Model> = related.into_iter().cloned().collect();
        self.assign(&association, &related)
    }

    /// Replace every member of a hasMany association
    pub fn set_related_many(&self, name: &str, related: &[Model]) -> ModelResult<()> {
        let association = self.association(name)?;
        if !association.is_has_many() {
            return Err(association.mismatch("expected a single model"));
        }
        self.assign(&association, related)
    }

    /// Append one member to a hasMany association
    pub fn add_related(&self, name: &str, related: &Model) -> ModelResult<()> {
        let association = self.association(name)?;
        if !association.is_has_many() {
            return Err(association.mismatch("use set_related for single associations"));
        }
        let mut members = self.members(&association)?;
        if !members.iter().any(|m| m == related) {
            members.push(related.clone());
        }
        self.assign(&association, &members)
    }

    /// Remove one member from a hasMany association
    pub fn remove_related(&self, name: &str, related: &Model) -> ModelResult<()> {
        let association = self.association(name)?;
        if !association.is_has_many() {
            return Err(association.mismatch("use set_related(name, None) for single associations"));
        }
        let members: Vec<Model> = self
            .members(&association)?
            .into_iter()
            .filter(|m| m != related)
            .collect();
        self.assign(&association, &members)
    }

    /// Assign raw ids (or `{type, id}` objects) to an association. Behaves
    /// like assigning the instances those ids name.
    pub fn set_foreign_key(&self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        let association = self.association(name)?;
        let refs = association.refs_from_value(&value.into())?;
        self.write_association(&association, refs, Vec::new())
    }

    /// Build an unsaved related instance wired to this one. Saving either
    /// side saves both.
    pub fn new_related(&self, name: &str, attrs: impl IntoAttrs) -> ModelResult<Model> {
        let association = self.association(name)?;
        let target = target_of(&association)?;
        let related = self.schema.new_model(&target, attrs)?;
        self.attach(&association, &related)?;
        Ok(related)
    }

    /// Build and save a related instance, then link it to this one
    pub fn create_related(&self, name: &str, attrs: impl IntoAttrs) -> ModelResult<Model> {
        let association = self.association(name)?;
        let target = target_of(&association)?;
        let related = self.schema.create(&target, attrs)?;
        self.attach(&association, &related)?;
        Ok(related)
    }

    fn attach(&self, association: &AssociationDescriptor, related: &Model) -> ModelResult<()> {
        if association.is_belongs_to() {
            self.set_related(&association.name, Some(related))
        } else {
            self.add_related(&association.name, related)
        }
    }

    /// Stored references plus unsaved members, as instances
    fn members(&self, association: &AssociationDescriptor) -> ModelResult<Vec<Model>> {
        let mut members = Vec::new();
        for model_ref in self.current_refs(association) {
            match self.schema.find(&model_ref.model, &model_ref.id)? {
                Some(model) => members.push(model),
                // keep dangling ids as they are
                None => members.push(Model::persisted(self.schema.clone(), &model_ref.model, model_ref.id)),
            }
        }
        members.extend(self.pending_models(&association.name));
        Ok(members)
    }

    fn assign(&self, association: &AssociationDescriptor, related: &[Model]) -> ModelResult<()> {
        let mut refs = Vec::new();
        let mut pending: Vec<Model> = Vec::new();
        for model in related {
            association.check_model(model.model_name())?;
            match model.model_ref() {
                Some(model_ref) => refs.push(model_ref),
                None if !pending.iter().any(|p| p.ptr_eq(model)) => pending.push(model.clone()),
                None => {}
            }
        }
        if association.is_belongs_to() && !pending.is_empty() {
            refs.clear();
        }
        self.write_association(association, refs, pending)
    }

    /// Store `refs` and `pending` as the full new value of an association
    pub(crate) fn write_association(
        &self,
        association: &AssociationDescriptor,
        refs: Vec<ModelRef>,
        pending: Vec<Model>,
    ) -> ModelResult<()> {
        self.schema.check_refs(association, &refs)?;

        match self.model_ref() {
            Some(owner) => {
                self.schema.sync(|sync| sync.replace(&owner, association, &refs))?;
                tracing::trace!("{}.{} written through", owner, association.name);
            }
            None => {
                self.state
                    .borrow_mut()
                    .attrs
                    .insert(association.foreign_key.clone(), association.value_from_refs(&refs));
            }
        }

        for related in &pending {
            self.stage_inverse(association, related)?;
        }
        // an instance already holding us strongly only gets a weak link back
        let links = pending
            .into_iter()
            .map(|related| {
                if related.ptr_eq(self) || related.holds_owned(self) {
                    PendingLink::Back(related.downgrade())
                } else {
                    PendingLink::Owned(related)
                }
            })
            .collect::<Vec<_>>();
        let mut state = self.state.borrow_mut();
        if links.is_empty() {
            state.pending.remove(&association.name);
        } else {
            state.pending.insert(association.name.clone(), links);
        }
        Ok(())
    }

    /// Record this instance on the inverse side of an unsaved related one
    fn stage_inverse(&self, association: &AssociationDescriptor, related: &Model) -> ModelResult<()> {
        let Some(inverse) = self.schema.registry().inverse_of(association, related.model_name()) else {
            return Ok(());
        };
        let inverse = inverse.clone();

        match self.model_ref() {
            Some(owner) => {
                let mut refs = related.current_refs(&inverse);
                if inverse.is_belongs_to() {
                    refs.clear();
                }
                if !refs.contains(&owner) {
                    refs.push(owner);
                }
                let mut state = related.state.borrow_mut();
                state.attrs.insert(inverse.foreign_key.clone(), inverse.value_from_refs(&refs));
                if inverse.is_belongs_to() {
                    state.pending.remove(&inverse.name);
                }
            }
            None => {
                if self.ptr_eq(related) {
                    return Ok(());
                }
                let mut state = related.state.borrow_mut();
                let links = state.pending.entry(inverse.name.clone()).or_default();
                if inverse.is_belongs_to() {
                    links.clear();
                }
                if !links.iter().any(|link| link.is(self)) {
                    links.push(PendingLink::Back(self.downgrade()));
                }
            }
        }
        Ok(())
    }

    /// References currently held, from the record when persisted
    pub(crate) fn current_refs(&self, association: &AssociationDescriptor) -> Vec<ModelRef> {
        if let Some(owner) = self.model_ref() {
            let staged = self.state.borrow().attrs.contains_key(&association.foreign_key);
            if !staged {
                return self.schema.sync(|sync| Ok(sync.stored_refs(&owner, association))).unwrap_or_default();
            }
        }
        let value = self.attr(&association.foreign_key).unwrap_or(Value::Null);
        association.refs_from_value(&value).unwrap_or_else(|err| {
            tracing::warn!("Ignoring malformed foreign key on {}: {}", self, err);
            Vec::new()
        })
    }

    /// Live unsaved related instances staged under `name`
    pub(crate) fn pending_models(&self, name: &str) -> Vec<Model> {
        let state = self.state.borrow();
        state
            .pending
            .get(name)
            .map(|links| links.iter().filter_map(PendingLink::upgrade).collect())
            .unwrap_or_default()
    }
}

fn target_of(association: &AssociationDescriptor) -> ModelResult<String> {
    association
        .target_model()
        .map(str::to_string)
        .ok_or_else(|| association.mismatch("cannot build an instance of a polymorphic association"))
}
