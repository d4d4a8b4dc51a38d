//! Relationship Registry - resolved model and association metadata
//!
//! Built once per schema and immutable afterwards.

use std::collections::BTreeMap;

use serde::Serialize;

use super::definition::ModelDefinition;
use super::inference::AssociationResolver;
use super::metadata::AssociationDescriptor;
use crate::config::SchemaConfig;
use crate::db::Attrs;
use crate::error::{ModelError, ModelResult};
use crate::inflection::collection_name;

/// Registered model type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEntry {
    pub name: String,
    /// Record store collection backing this type
    pub collection: String,
    /// Attribute defaults for new instances
    pub attributes: Attrs,
    /// Associations in declaration order
    pub associations: Vec<AssociationDescriptor>,
}

impl ModelEntry {
    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// The association stored under the given foreign key attribute
    pub fn association_for_key(&self, foreign_key: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.foreign_key == foreign_key)
    }
}

/// Resolved metadata for every registered model type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssociationRegistry {
    models: BTreeMap<String, ModelEntry>,
}

impl AssociationRegistry {
    /// Resolve a full set of definitions
    pub fn from_definitions(definitions: &BTreeMap<String, ModelDefinition>, config: &SchemaConfig) -> ModelResult<Self> {
        let mut resolved = AssociationResolver::new(definitions, config).resolve()?;

        let mut models = BTreeMap::new();
        let mut collections: BTreeMap<String, String> = BTreeMap::new();
        for (name, definition) in definitions {
            let collection = collection_name(name, config.collection_naming);
            if let Some(other) = collections.insert(collection.clone(), name.clone()) {
                return Err(ModelError::Configuration(format!(
                    "models '{}' and '{}' would share the collection '{}'",
                    other, name, collection
                )));
            }

            models.insert(
                name.clone(),
                ModelEntry {
                    name: name.clone(),
                    collection,
                    attributes: definition.attributes.clone(),
                    associations: resolved.remove(name).unwrap_or_default(),
                },
            );
        }

        let registry = Self { models };
        tracing::debug!(
            "Registered {} model(s) with {} association(s)",
            registry.models.len(),
            registry.models.values().map(|m| m.associations.len()).sum::<usize>()
        );
        Ok(registry)
    }

    pub fn model(&self, name: &str) -> ModelResult<&ModelEntry> {
        self.models
            .get(name)
            .ok_or_else(|| ModelError::UnregisteredType(name.to_string()))
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelEntry> {
        self.models.values()
    }

    pub fn collection_name(&self, model: &str) -> ModelResult<&str> {
        Ok(self.model(model)?.collection.as_str())
    }

    /// Look up an association by owner and name
    pub fn association(&self, model: &str, name: &str) -> ModelResult<&AssociationDescriptor> {
        self.model(model)?
            .association(name)
            .ok_or_else(|| ModelError::unknown_association(model, name))
    }

    /// Every association of a model type, keyed by name
    pub fn associations_for(&self, model: &str) -> ModelResult<BTreeMap<String, AssociationDescriptor>> {
        Ok(self
            .model(model)?
            .associations
            .iter()
            .map(|a| (a.name.clone(), a.clone()))
            .collect())
    }

    /// The inverse of `association` when it points at `related_model`
    pub fn inverse_of(&self, association: &AssociationDescriptor, related_model: &str) -> Option<&AssociationDescriptor> {
        let inverse = association.inverse_for(related_model)?;
        self.models.get(related_model)?.association(inverse)
    }

    /// Associations on any model that can hold references to `model`
    pub fn dependents_of(&self, model: &str) -> Vec<&AssociationDescriptor> {
        self.models
            .values()
            .flat_map(|entry| entry.associations.iter())
            .filter(|a| a.accepts(model))
            .collect()
    }
}
