//! Model lifecycle - save, reload and destroy

use std::collections::BTreeMap;

use serde_json::Value;

use super::instance::{Model, PendingLink};
use crate::db::RecordId;
use crate::error::{ModelError, ModelResult};
use crate::relationships::{AssociationDescriptor, ModelRef};

type PendingRelated = Vec<(AssociationDescriptor, Vec<Model>)>;

impl Model {
    /// Write this instance and every unsaved instance staged on its
    /// associations. Parents referenced through belongsTo are saved first.
    pub fn save(&self) -> ModelResult<()> {
        if self.is_saving() {
            return Ok(());
        }
        let pending = {
            let mut state = self.state.borrow_mut();
            state.saving = true;
            std::mem::take(&mut state.pending)
        };

        let result = self.save_with(&pending);

        let mut state = self.state.borrow_mut();
        state.saving = false;
        if result.is_err() {
            for (name, links) in pending {
                state.pending.entry(name).or_insert(links);
            }
        }
        result
    }

    /// Drop staged changes and read the record again
    pub fn reload(&self) -> ModelResult<()> {
        let id = self
            .id()
            .ok_or_else(|| ModelError::NotFound(format!("{} has not been saved", self)))?;
        if self.schema.record(self.model_name(), &id).is_none() {
            return Err(ModelError::NotFound(format!("{}({})", self.model_name(), id)));
        }

        let mut state = self.state.borrow_mut();
        state.attrs.clear();
        state.pending.clear();
        Ok(())
    }

    /// Delete the record and remove every stored reference to it. The
    /// instance becomes unsaved and keeps its plain attributes.
    pub fn destroy(&self) -> ModelResult<()> {
        let Some(owner) = self.model_ref() else {
            return Ok(());
        };

        let removed = self
            .schema
            .with_collection_mut(self.model_name(), |collection| Ok(collection.remove(&owner.id)))?;
        self.schema.sync(|sync| sync.cascade_destroy(&owner))?;

        let entry = self.schema.registry().model(self.model_name())?;
        let mut attrs = removed.into_iter().next().unwrap_or_default();
        attrs.remove("id");
        for association in &entry.associations {
            attrs.insert(association.foreign_key.clone(), association.empty_value());
        }

        let mut state = self.state.borrow_mut();
        for (key, value) in std::mem::take(&mut state.attrs) {
            if entry.association_for_key(&key).is_none() {
                attrs.insert(key, value);
            }
        }
        state.attrs = attrs;
        state.id = None;
        state.pending.clear();
        Ok(())
    }

    fn save_with(&self, pending: &BTreeMap<String, Vec<PendingLink>>) -> ModelResult<()> {
        let entry = self.schema.registry().model(self.model_name())?;
        let related: PendingRelated = pending
            .iter()
            .filter_map(|(name, links)| {
                let association = entry.association(name)?.clone();
                Some((association, links.iter().filter_map(PendingLink::upgrade).collect()))
            })
            .collect();

        for (association, models) in &related {
            if association.is_belongs_to() {
                save_unsaved(models)?;
            }
        }

        let owner = match self.model_ref() {
            Some(owner) => {
                self.update_record(&owner)?;
                owner
            }
            None => self.insert_record(&related)?,
        };

        for (association, models) in &related {
            save_unsaved(models)?;
            let saved: Vec<ModelRef> = models.iter().filter_map(Model::model_ref).collect();
            if saved.is_empty() {
                continue;
            }

            let current = self.current_refs(association);
            let refs = merge_refs(association, current.clone(), saved);
            if refs != current {
                self.schema.sync(|sync| sync.replace(&owner, association, &refs))?;
            }
        }
        Ok(())
    }

    fn insert_record(&self, related: &PendingRelated) -> ModelResult<ModelRef> {
        let mut attrs = self.state.borrow().attrs.clone();
        for (association, models) in related {
            let saved: Vec<ModelRef> = models.iter().filter_map(Model::model_ref).collect();
            if saved.is_empty() {
                continue;
            }
            let value = attrs.get(&association.foreign_key).cloned().unwrap_or(Value::Null);
            let current = association.refs_from_value(&value).unwrap_or_default();
            let refs = merge_refs(association, current, saved);
            attrs.insert(association.foreign_key.clone(), association.value_from_refs(&refs));
        }

        let record = self
            .schema
            .with_collection_mut(self.model_name(), |collection| collection.insert(attrs))?;
        let id = RecordId::of(&record)
            .ok_or_else(|| ModelError::Serialization(format!("stored {} has no id", self.model_name())))?;
        {
            let mut state = self.state.borrow_mut();
            state.id = Some(id.clone());
            state.attrs.clear();
        }

        let owner = ModelRef::new(self.model_name(), id);
        let entry = self.schema.registry().model(self.model_name())?;
        self.schema.sync(|sync| {
            for association in &entry.associations {
                let refs = sync.stored_refs(&owner, association);
                sync.reconcile(&owner, association, &[], &refs)?;
            }
            Ok(())
        })?;

        tracing::debug!("Saved new {}", owner);
        Ok(owner)
    }

    fn update_record(&self, owner: &ModelRef) -> ModelResult<()> {
        let staged = self.state.borrow().attrs.clone();
        self.schema
            .with_collection_mut(self.model_name(), |collection| collection.update(&owner.id, staged))?;
        self.state.borrow_mut().attrs.clear();
        tracing::trace!("Saved {}", owner);
        Ok(())
    }
}

fn save_unsaved(models: &[Model]) -> ModelResult<()> {
    for model in models {
        if model.id().is_none() && !model.is_saving() {
            model.save()?;
        }
    }
    Ok(())
}

// belongsTo keeps the latest reference; hasMany appends new ones
fn merge_refs(association: &AssociationDescriptor, current: Vec<ModelRef>, saved: Vec<ModelRef>) -> Vec<ModelRef> {
    if association.is_belongs_to() {
        return saved.into_iter().last().into_iter().collect();
    }
    let mut refs = current;
    for model_ref in saved {
        if !refs.contains(&model_ref) {
            refs.push(model_ref);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::IntoAttrs;
    use crate::relationships::ModelDefinition;
    use crate::{ModelError, Schema};

    fn schema() -> Schema {
        Schema::new(vec![
            ("author", ModelDefinition::new().attribute("name", "").has_many("posts")),
            ("post", ModelDefinition::new().attribute("title", "").belongs_to("author").has_many("tags")),
            ("tag", ModelDefinition::new().has_many("posts")),
        ])
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let schema = schema();
        let post = schema.create("post", json!({ "title": "Lorem", "views": 3 })).unwrap();
        let found = schema.find("post", post.id().unwrap()).unwrap().unwrap();

        let expected = json!({ "id": "1", "title": "Lorem", "views": 3, "authorId": null, "tagIds": [] });
        assert_eq!(found.attrs(), expected.clone().into_attrs().unwrap());

        found.reload().unwrap();
        found.reload().unwrap();
        assert_eq!(found.attrs(), expected.into_attrs().unwrap());
    }

    #[test]
    fn test_reload_discards_staged_changes() {
        let schema = schema();
        let post = schema.create("post", json!({ "title": "Lorem" })).unwrap();
        post.set_attr("title", "Ipsum").unwrap();
        post.reload().unwrap();
        assert_eq!(post.attr("title"), Some(json!("Lorem")));

        let draft = schema.new_model("post", ()).unwrap();
        assert!(matches!(draft.reload(), Err(ModelError::NotFound(_))));
    }

    #[test]
    fn test_save_missing_record() {
        let schema = schema();
        let post = schema.create("post", ()).unwrap();
        schema.db_mut().collection_mut("posts").unwrap().remove(1);
        assert!(!post.is_saved());
        assert!(matches!(post.save(), Err(ModelError::NotFound(_))));
    }

    #[test]
    fn test_destroy_cascades() {
        let schema = schema();
        let author = schema.create("author", ()).unwrap();
        let first = author.create_related("posts", ()).unwrap();
        let second = author.create_related("posts", ()).unwrap();
        let tag = schema.create("tag", ()).unwrap();
        tag.set_related_many("posts", &[first.clone(), second.clone()]).unwrap();

        author.destroy().unwrap();
        assert!(author.is_new());
        assert_eq!(first.attr("authorId"), Some(json!(null)));
        assert_eq!(second.attr("authorId"), Some(json!(null)));

        first.destroy().unwrap();
        assert_eq!(tag.attr("postIds"), Some(json!(["2"])));
        assert_eq!(schema.all("post").unwrap().len(), 1);
    }

    #[test]
    fn test_destroy_unsaved_is_a_no_op() {
        let schema = schema();
        let draft = schema.new_model("post", json!({ "title": "Draft" })).unwrap();
        draft.destroy().unwrap();
        assert_eq!(draft.attr("title"), Some(json!("Draft")));
    }

    #[test]
    fn test_save_unsaved_graph() {
        let schema = schema();
        let author = schema.new_model("author", json!({ "name": "Zelda" })).unwrap();
        let first = author.new_related("posts", json!({ "title": "One" })).unwrap();
        let second = author.new_related("posts", json!({ "title": "Two" })).unwrap();

        author.save().unwrap();
        assert!(first.is_saved());
        assert!(second.is_saved());
        assert_eq!(author.attr("postIds"), Some(json!(["1", "2"])));
        assert_eq!(second.attr("authorId"), Some(json!("1")));
    }

    #[test]
    fn test_update() {
        let schema = schema();
        let post = schema.create("post", ()).unwrap();
        let tag = schema.create("tag", ()).unwrap();

        post.update(json!({ "title": "New", "tagIds": [tag.id().unwrap().as_str()] })).unwrap();
        assert_eq!(schema.find("post", 1).unwrap().unwrap().attr("title"), Some(json!("New")));
        assert_eq!(tag.attr("postIds"), Some(json!(["1"])));

        post.update_attr("title", "Newer").unwrap();
        assert_eq!(schema.find("post", 1).unwrap().unwrap().attr("title"), Some(json!("Newer")));
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let schema = schema();
        let post = schema.create("post", json!({ "title": "Old" })).unwrap();
        let tag = schema.create("tag", ()).unwrap();
        let before = schema.dump();

        let err = post
            .update(json!({ "title": "New", "tagIds": ["1"], "author": 1 }))
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { ref association, .. } if association == "author"));

        let err = post.update(json!({ "tagIds": ["1"], "authorId": { "type": "tag" } })).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));

        assert_eq!(schema.dump(), before);
        assert_eq!(post.attr("title"), Some(json!("Old")));
        assert_eq!(tag.attr("postIds"), Some(json!([])));
    }
}
