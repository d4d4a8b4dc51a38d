//! Model definitions - declared attributes and associations per model type
//!
//! Definitions are plain data. They are consumed once by the schema builder
//! and resolved as a whole, so declaration order does not matter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::metadata::{AssociationKind, InverseOption};
use crate::db::Attrs;

/// Options accepted by `belongs_to_with` / `has_many_with`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationOptions {
    /// Target model type; defaults to the (singularized) association name
    pub model: Option<String>,
    /// Store `{type, id}` pairs pointing at any model type
    pub polymorphic: bool,
    pub inverse: InverseOption,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    /// Bind to the named association on the related model
    pub fn inverse(mut self, name: impl Into<String>) -> Self {
        self.inverse = InverseOption::Explicit(name.into());
        self
    }

    /// Make the association one-way
    pub fn no_inverse(mut self) -> Self {
        self.inverse = InverseOption::Disabled;
        self
    }
}

/// A single association declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDeclaration {
    pub name: String,
    pub kind: AssociationKind,
    #[serde(flatten)]
    pub options: AssociationOptions,
}

/// Declared attributes and associations of one model type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefinition {
    /// Attribute defaults applied to new instances
    pub attributes: Attrs,
    pub associations: Vec<AssociationDeclaration>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute with a default value
    pub fn attribute(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), default.into());
        self
    }

    /// `author: belongsTo()` - target model named after the association
    pub fn belongs_to(self, name: impl Into<String>) -> Self {
        self.belongs_to_with(name, AssociationOptions::new())
    }

    /// `writer: belongsTo("user")`
    pub fn belongs_to_model(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.belongs_to_with(name, AssociationOptions::new().model(model))
    }

    pub fn belongs_to_with(self, name: impl Into<String>, options: AssociationOptions) -> Self {
        self.associate(name.into(), AssociationKind::BelongsTo, options)
    }

    /// `posts: hasMany()` - target model is the singularized name
    pub fn has_many(self, name: impl Into<String>) -> Self {
        self.has_many_with(name, AssociationOptions::new())
    }

    /// `drafts: hasMany("post")`
    pub fn has_many_model(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.has_many_with(name, AssociationOptions::new().model(model))
    }

    pub fn has_many_with(self, name: impl Into<String>, options: AssociationOptions) -> Self {
        self.associate(name.into(), AssociationKind::HasMany, options)
    }

    fn associate(mut self, name: String, kind: AssociationKind, options: AssociationOptions) -> Self {
        self.associations.push(AssociationDeclaration { name, kind, options });
        self
    }
}
