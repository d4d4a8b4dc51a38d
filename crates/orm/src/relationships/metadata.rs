//! Relationship Metadata System - Association descriptors and foreign key shapes

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::RecordId;
use crate::error::{ModelError, ModelResult};

/// Defines the kind of association declared on a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Single reference stored on the owner (`authorId`)
    BelongsTo,
    /// List of references stored on the owner (`postIds`)
    HasMany,
}

impl AssociationKind {
    /// Returns true if this association reads as a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

/// What an association points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationTarget {
    /// Exactly one model type
    Model(String),
    /// Any registered model type, stored as `{type, id}` pairs
    Polymorphic,
}

/// How an association's inverse is chosen
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverseOption {
    /// Infer the inverse from the related model's declarations
    #[default]
    Implicit,
    /// Bind to the named association on the related model
    Explicit(String),
    /// One-way association, never synchronized
    Disabled,
}

/// Reference to one record of one model type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
    #[serde(rename = "type")]
    pub model: String,
    pub id: RecordId,
}

impl ModelRef {
    pub fn new(model: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }

    /// `{ "type": .., "id": .. }` form used by polymorphic foreign keys
    pub fn to_value(&self) -> Value {
        json!({ "type": self.model, "id": self.id.as_str() })
    }

    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let model = object.get("type")?.as_str()?;
        let id = RecordId::from_value(object.get("id")?)?;
        Some(Self::new(model, id))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model, self.id)
    }
}

/// One declared association after registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    /// Association name on the owner (`author`, `posts`)
    pub name: String,

    /// Model type that declares the association
    pub owner: String,

    pub kind: AssociationKind,

    pub target: AssociationTarget,

    /// Inverse option as declared
    pub inverse_option: InverseOption,

    /// Attribute on the owner holding the reference(s)
    pub foreign_key: String,

    /// Resolved inverse association name, per related model type. A
    /// monomorphic association has at most one entry, keyed by its target.
    pub inverses: BTreeMap<String, String>,
}

impl AssociationDescriptor {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: AssociationKind,
        target: AssociationTarget,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            kind,
            target,
            inverse_option: InverseOption::Implicit,
            foreign_key: foreign_key.into(),
            inverses: BTreeMap::new(),
        }
    }

    pub fn with_inverse_option(mut self, inverse_option: InverseOption) -> Self {
        self.inverse_option = inverse_option;
        self
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.target, AssociationTarget::Polymorphic)
    }

    pub fn is_belongs_to(&self) -> bool {
        self.kind == AssociationKind::BelongsTo
    }

    pub fn is_has_many(&self) -> bool {
        self.kind == AssociationKind::HasMany
    }

    /// The target model type, for monomorphic associations
    pub fn target_model(&self) -> Option<&str> {
        match &self.target {
            AssociationTarget::Model(name) => Some(name),
            AssociationTarget::Polymorphic => None,
        }
    }

    /// Whether records of `model` may be stored in this association
    pub fn accepts(&self, model: &str) -> bool {
        match &self.target {
            AssociationTarget::Model(name) => name == model,
            AssociationTarget::Polymorphic => true,
        }
    }

    /// Inverse association name on `related_model`, if two-way
    pub fn inverse_for(&self, related_model: &str) -> Option<&str> {
        self.inverses.get(related_model).map(String::as_str)
    }

    pub fn has_inverse(&self) -> bool {
        !self.inverses.is_empty()
    }

    /// True for a reflexive association that is its own inverse
    pub fn is_self_inverse(&self) -> bool {
        self.inverse_for(&self.owner) == Some(self.name.as_str())
    }

    /// Stored value for an owner with no references
    pub fn empty_value(&self) -> Value {
        match self.kind {
            AssociationKind::BelongsTo => Value::Null,
            AssociationKind::HasMany => Value::Array(Vec::new()),
        }
    }

    /// Parse a foreign key value into references, checking its shape
    pub fn refs_from_value(&self, value: &Value) -> ModelResult<Vec<ModelRef>> {
        match (self.kind, value) {
            (_, Value::Null) => Ok(Vec::new()),
            (AssociationKind::BelongsTo, single) => Ok(vec![self.parse_ref(single)?]),
            (AssociationKind::HasMany, Value::Array(items)) => {
                let mut refs = Vec::with_capacity(items.len());
                for item in items {
                    let model_ref = self.parse_ref(item)?;
                    if !refs.contains(&model_ref) {
                        refs.push(model_ref);
                    }
                }
                Ok(refs)
            }
            (AssociationKind::HasMany, other) => Err(self.mismatch(format!(
                "expected an array for '{}', got {}",
                self.foreign_key, other
            ))),
        }
    }

    /// Encode references in the stored foreign key shape
    pub fn value_from_refs(&self, refs: &[ModelRef]) -> Value {
        let encode = |model_ref: &ModelRef| {
            if self.is_polymorphic() {
                model_ref.to_value()
            } else {
                model_ref.id.to_value()
            }
        };
        match self.kind {
            AssociationKind::BelongsTo => refs.first().map(encode).unwrap_or(Value::Null),
            AssociationKind::HasMany => Value::Array(refs.iter().map(encode).collect()),
        }
    }

    /// Reject references whose model this association cannot hold
    pub fn check_model(&self, model: &str) -> ModelResult<()> {
        if self.accepts(model) {
            Ok(())
        } else {
            Err(self.mismatch(format!(
                "expected a {}, got a {}",
                self.target_model().unwrap_or("model"),
                model
            )))
        }
    }

    fn parse_ref(&self, value: &Value) -> ModelResult<ModelRef> {
        match &self.target {
            AssociationTarget::Model(model) => {
                if value.is_object() {
                    let model_ref = ModelRef::from_value(value)
                        .ok_or_else(|| self.mismatch(format!("invalid reference {}", value)))?;
                    self.check_model(&model_ref.model)?;
                    return Ok(model_ref);
                }
                RecordId::from_value(value)
                    .map(|id| ModelRef::new(model.clone(), id))
                    .ok_or_else(|| self.mismatch(format!("invalid id {}", value)))
            }
            AssociationTarget::Polymorphic => ModelRef::from_value(value).ok_or_else(|| {
                self.mismatch(format!(
                    "polymorphic keys must be {{type, id}} objects, got {}",
                    value
                ))
            }),
        }
    }

    pub(crate) fn mismatch(&self, message: impl Into<String>) -> ModelError {
        ModelError::type_mismatch(&self.owner, &self.name, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_author() -> AssociationDescriptor {
        AssociationDescriptor::new(
            "post",
            "author",
            AssociationKind::BelongsTo,
            AssociationTarget::Model("author".to_string()),
            "authorId",
        )
    }

    fn post_tags() -> AssociationDescriptor {
        AssociationDescriptor::new(
            "post",
            "tags",
            AssociationKind::HasMany,
            AssociationTarget::Model("tag".to_string()),
            "tagIds",
        )
    }

    fn comment_commentable() -> AssociationDescriptor {
        AssociationDescriptor::new(
            "comment",
            "commentable",
            AssociationKind::BelongsTo,
            AssociationTarget::Polymorphic,
            "commentableId",
        )
    }

    #[test]
    fn test_belongs_to_values() {
        let author = post_author();
        assert_eq!(author.refs_from_value(&json!(1)).unwrap(), vec![ModelRef::new("author", "1")]);
        assert_eq!(author.refs_from_value(&json!(null)).unwrap(), vec![]);
        assert_eq!(author.value_from_refs(&[ModelRef::new("author", 3)]), json!("3"));
        assert_eq!(author.value_from_refs(&[]), json!(null));
        assert!(author.refs_from_value(&json!([1])).is_err());
    }

    #[test]
    fn test_has_many_values_dedupe_and_keep_order() {
        let tags = post_tags();
        let refs = tags.refs_from_value(&json!(["3", 1, "3"])).unwrap();
        assert_eq!(refs, vec![ModelRef::new("tag", "3"), ModelRef::new("tag", "1")]);
        assert_eq!(tags.value_from_refs(&refs), json!(["3", "1"]));
        assert!(matches!(tags.refs_from_value(&json!("1")), Err(ModelError::TypeMismatch { .. })));
    }

    #[test]
    fn test_polymorphic_values() {
        let commentable = comment_commentable();
        let refs = commentable.refs_from_value(&json!({ "type": "post", "id": 2 })).unwrap();
        assert_eq!(refs, vec![ModelRef::new("post", "2")]);
        assert_eq!(commentable.value_from_refs(&refs), json!({ "type": "post", "id": "2" }));
        assert_eq!(commentable.value_from_refs(&[]), json!(null));
        assert!(commentable.refs_from_value(&json!("2")).is_err());
    }

    #[test]
    fn test_monomorphic_rejects_other_types() {
        let author = post_author();
        assert!(author.refs_from_value(&json!({ "type": "author", "id": "1" })).is_ok());
        let err = author.refs_from_value(&json!({ "type": "tag", "id": "1" })).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
        assert!(author.check_model("tag").is_err());
        assert!(comment_commentable().check_model("tag").is_ok());
    }

    #[test]
    fn test_inverse_lookup() {
        let mut author = post_author();
        assert!(!author.has_inverse());
        author.inverses.insert("author".to_string(), "posts".to_string());
        assert_eq!(author.inverse_for("author"), Some("posts"));
        assert!(!author.is_self_inverse());
    }
}
