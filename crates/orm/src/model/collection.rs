//! Model collections - ordered views over model instances
//!
//! A collection is not an entity. It never touches the store on its own;
//! the bulk operations just fan out to each member.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use serde_json::Value;

use super::instance::Model;
use crate::db::RecordId;
use crate::error::{ModelError, ModelResult};

/// Ordered instances of one model type, or of any type when polymorphic
#[derive(Clone, Default, PartialEq)]
pub struct Collection {
    model_name: Option<String>,
    models: Vec<Model>,
}

impl Collection {
    pub fn new(model_name: impl Into<String>, models: Vec<Model>) -> Self {
        Self {
            model_name: Some(model_name.into()),
            models,
        }
    }

    /// A collection that may mix model types
    pub fn polymorphic(models: Vec<Model>) -> Self {
        Self {
            model_name: None,
            models,
        }
    }

    /// The member type, `None` for polymorphic collections
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.model_name.is_none()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.models.iter()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn into_models(self) -> Vec<Model> {
        self.models
    }

    pub fn first(&self) -> Option<&Model> {
        self.models.first()
    }

    pub fn get(&self, index: usize) -> Option<&Model> {
        self.models.get(index)
    }

    /// Ids of the saved members, in order
    pub fn ids(&self) -> Vec<RecordId> {
        self.models.iter().filter_map(Model::id).collect()
    }

    pub fn includes(&self, model: &Model) -> bool {
        self.models.iter().any(|m| m == model)
    }

    pub fn filter<F>(&self, predicate: F) -> Collection
    where
        F: Fn(&Model) -> bool,
    {
        self.with_models(self.models.iter().filter(|m| predicate(*m)).cloned().collect())
    }

    pub fn sort_by<F>(&self, compare: F) -> Collection
    where
        F: FnMut(&Model, &Model) -> Ordering,
    {
        let mut models = self.models.clone();
        models.sort_by(compare);
        self.with_models(models)
    }

    /// Members in `range`, clamped to the collection bounds
    pub fn slice(&self, range: Range<usize>) -> Collection {
        let end = range.end.min(self.models.len());
        let start = range.start.min(end);
        self.with_models(self.models[start..end].to_vec())
    }

    /// Append a member. Monomorphic collections only take their own type.
    pub fn add(&mut self, model: Model) -> ModelResult<()> {
        if let Some(expected) = &self.model_name {
            if model.model_name() != expected.as_str() {
                return Err(ModelError::TypeMismatch {
                    model: expected.clone(),
                    association: "collection".to_string(),
                    message: format!("cannot add {} to a collection of {}", model, expected),
                });
            }
        }
        self.models.push(model);
        Ok(())
    }

    /// Drop every member equal to `model`
    pub fn remove(&mut self, model: &Model) {
        self.models.retain(|m| m != model);
    }

    /// Append the members of `other` that are not already present
    pub fn merge(&mut self, other: Collection) -> ModelResult<()> {
        for model in other {
            if !self.includes(&model) {
                self.add(model)?;
            }
        }
        Ok(())
    }

    /// Set one attribute on every member and save it
    pub fn update(&self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        for model in &self.models {
            model.update_attr(key, value.clone())?;
        }
        Ok(())
    }

    pub fn save(&self) -> ModelResult<()> {
        self.models.iter().try_for_each(Model::save)
    }

    pub fn reload(&self) -> ModelResult<()> {
        self.models.iter().try_for_each(Model::reload)
    }

    pub fn destroy(&self) -> ModelResult<()> {
        self.models.iter().try_for_each(Model::destroy)
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.models.iter().map(Model::to_json).collect())
    }

    fn with_models(&self, models: Vec<Model>) -> Collection {
        Collection {
            model_name: self.model_name.clone(),
            models,
        }
    }
}

impl IntoIterator for Collection {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self
            .models
            .iter()
            .map(|m| match m.id() {
                Some(id) if self.is_polymorphic() => format!("{}:{}", m.model_name(), id),
                Some(id) => id.to_string(),
                None => "new".to_string(),
            })
            .collect();
        let name = self.model_name.as_deref().unwrap_or("polymorphic");
        write!(f, "collection:{}({})", name, members.join(","))
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("model_name", &self.model_name)
            .field("models", &self.models)
            .finish()
    }
}
