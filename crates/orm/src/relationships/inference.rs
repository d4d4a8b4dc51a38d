//! Relationship Inference - association descriptors and inverse resolution
//!
//! Runs once per schema as a closed pass over every model definition:
//! descriptors are built for all types first, then each association's
//! inverse is chosen from the related type's declarations. Nothing is
//! cached between passes.

use std::collections::BTreeMap;

use super::definition::ModelDefinition;
use super::metadata::{AssociationDescriptor, AssociationTarget, InverseOption};
use crate::config::SchemaConfig;
use crate::error::{ModelError, ModelResult};
use crate::inflection::{belongs_to_key, has_many_key, singularize};

/// Descriptors for every model type, in declaration order
pub type ResolvedAssociations = BTreeMap<String, Vec<AssociationDescriptor>>;

/// Builds association descriptors and infers their inverses
pub struct AssociationResolver<'a> {
    definitions: &'a BTreeMap<String, ModelDefinition>,
    config: &'a SchemaConfig,
}

impl<'a> AssociationResolver<'a> {
    pub fn new(definitions: &'a BTreeMap<String, ModelDefinition>, config: &'a SchemaConfig) -> Self {
        Self { definitions, config }
    }

    /// Build every descriptor and bind inverses
    pub fn resolve(&self) -> ModelResult<ResolvedAssociations> {
        let mut descriptors = self.build_descriptors()?;

        let mut bindings = Vec::new();
        for (model, associations) in &descriptors {
            for association in associations {
                for related in self.related_models(association) {
                    if let Some(inverse) = resolve_inverse(&descriptors, association, &related)? {
                        bindings.push((model.clone(), association.name.clone(), related, inverse));
                    }
                }
            }
        }

        for (model, name, related, inverse) in bindings {
            tracing::trace!("Bound {}.{} <-> {}.{}", model, name, related, inverse);
            if let Some(association) = descriptors
                .get_mut(&model)
                .and_then(|list| list.iter_mut().find(|a| a.name == name))
            {
                association.inverses.insert(related, inverse);
            }
        }

        check_symmetry(&descriptors)?;
        Ok(descriptors)
    }

    fn build_descriptors(&self) -> ModelResult<ResolvedAssociations> {
        let mut resolved = ResolvedAssociations::new();

        for (model, definition) in self.definitions {
            let mut associations: Vec<AssociationDescriptor> = Vec::new();

            for declaration in &definition.associations {
                let name = &declaration.name;
                if associations.iter().any(|a| &a.name == name) {
                    return Err(ModelError::Configuration(format!(
                        "{} declares the association '{}' more than once",
                        model, name
                    )));
                }

                let target = if declaration.options.polymorphic {
                    AssociationTarget::Polymorphic
                } else {
                    let target = match &declaration.options.model {
                        Some(target) => target.clone(),
                        None if declaration.kind.is_collection() => singularize(name),
                        None => name.clone(),
                    };
                    if !self.definitions.contains_key(&target) {
                        return Err(ModelError::Configuration(format!(
                            "{}.{} points at '{}', which is not a registered model",
                            model, name, target
                        )));
                    }
                    AssociationTarget::Model(target)
                };

                let foreign_key = if declaration.kind.is_collection() {
                    has_many_key(name, self.config.foreign_key_convention)
                } else {
                    belongs_to_key(name, self.config.foreign_key_convention)
                };

                if let Some(clash) = associations.iter().find(|a| a.foreign_key == foreign_key) {
                    return Err(ModelError::Configuration(format!(
                        "{}.{} and {}.{} both store their keys in '{}'",
                        model, clash.name, model, name, foreign_key
                    )));
                }
                if foreign_key == "id" || definition.attributes.contains_key(&foreign_key) {
                    return Err(ModelError::Configuration(format!(
                        "{}.{} foreign key '{}' collides with a declared attribute",
                        model, name, foreign_key
                    )));
                }

                associations.push(
                    AssociationDescriptor::new(model.clone(), name.clone(), declaration.kind, target, foreign_key)
                        .with_inverse_option(declaration.options.inverse.clone()),
                );
            }

            resolved.insert(model.clone(), associations);
        }

        Ok(resolved)
    }

    /// Model types an association may point at
    fn related_models(&self, association: &AssociationDescriptor) -> Vec<String> {
        match &association.target {
            AssociationTarget::Model(target) => vec![target.clone()],
            AssociationTarget::Polymorphic => self.definitions.keys().cloned().collect(),
        }
    }
}

/// Whether `candidate` may pair with `association` without an explicit inverse.
/// Polymorphic associations only pair implicitly with associations naming
/// their owner; monomorphic ones also pair with polymorphic candidates.
fn implicitly_eligible(association: &AssociationDescriptor, candidate: &AssociationDescriptor) -> bool {
    if association.is_polymorphic() {
        candidate.target_model() == Some(association.owner.as_str())
    } else {
        candidate.accepts(&association.owner)
    }
}

fn resolve_inverse(
    descriptors: &ResolvedAssociations,
    association: &AssociationDescriptor,
    related: &str,
) -> ModelResult<Option<String>> {
    let owner = association.owner.as_str();
    let candidates = descriptors.get(related).map(Vec::as_slice).unwrap_or(&[]);

    match &association.inverse_option {
        InverseOption::Disabled => Ok(None),

        InverseOption::Explicit(inverse_name) => {
            let candidate = match candidates.iter().find(|c| &c.name == inverse_name) {
                Some(candidate) if candidate.accepts(owner) => candidate,
                // A polymorphic association only pairs with the types that declare the inverse
                _ if association.is_polymorphic() => return Ok(None),
                Some(candidate) => {
                    return Err(ModelError::Configuration(format!(
                        "{}.{} names {}.{} as its inverse, but that association does not point at {}",
                        owner, association.name, related, candidate.name, owner
                    )))
                }
                None => {
                    return Err(ModelError::Configuration(format!(
                        "{}.{} names '{}' as its inverse, but {} has no such association",
                        owner, association.name, inverse_name, related
                    )))
                }
            };

            match &candidate.inverse_option {
                InverseOption::Explicit(back) if back != &association.name => Err(ModelError::Configuration(format!(
                    "{}.{} names {}.{} as its inverse, but {}.{} names '{}'",
                    owner, association.name, related, candidate.name, related, candidate.name, back
                ))),
                InverseOption::Disabled => Err(ModelError::Configuration(format!(
                    "{}.{} names {}.{} as its inverse, but that association is one-way",
                    owner, association.name, related, candidate.name
                ))),
                _ => Ok(Some(candidate.name.clone())),
            }
        }

        InverseOption::Implicit => {
            // Associations that explicitly name this one win
            let claims: Vec<&AssociationDescriptor> = candidates
                .iter()
                .filter(|c| c.accepts(owner) && c.inverse_option == InverseOption::Explicit(association.name.clone()))
                .collect();
            match claims.as_slice() {
                [] => {}
                [claim] => return Ok(Some(claim.name.clone())),
                _ => return Err(ambiguous(association, related)),
            }

            let owner_associations = descriptors.get(owner).map(Vec::as_slice).unwrap_or(&[]);
            let eligible: Vec<&AssociationDescriptor> = candidates
                .iter()
                .filter(|c| c.inverse_option == InverseOption::Implicit)
                .filter(|c| implicitly_eligible(association, c))
                .filter(|c| {
                    // Skip candidates another association on the owner claims explicitly
                    !owner_associations.iter().any(|other| {
                        other.name != association.name
                            && other.accepts(related)
                            && other.inverse_option == InverseOption::Explicit(c.name.clone())
                    })
                })
                .collect();

            match eligible.as_slice() {
                [] => Ok(None),
                [only] => Ok(Some(only.name.clone())),
                _ => Err(ambiguous(association, related)),
            }
        }
    }
}

fn ambiguous(association: &AssociationDescriptor, related: &str) -> ModelError {
    ModelError::AmbiguousInverse {
        model: association.owner.clone(),
        association: association.name.clone(),
        target: related.to_string(),
    }
}

/// Every binding must be mirrored by its partner
fn check_symmetry(descriptors: &ResolvedAssociations) -> ModelResult<()> {
    for (model, associations) in descriptors {
        for association in associations {
            for (related, inverse_name) in &association.inverses {
                let mirrored = descriptors
                    .get(related)
                    .and_then(|list| list.iter().find(|c| &c.name == inverse_name))
                    .and_then(|inverse| inverse.inverse_for(model));
                if mirrored != Some(association.name.as_str()) {
                    return Err(ModelError::Configuration(format!(
                        "{}.{} resolves to {}.{} as its inverse, but {}.{} resolves to {}",
                        model,
                        association.name,
                        related,
                        inverse_name,
                        related,
                        inverse_name,
                        mirrored.map(|m| format!("{}.{}", model, m)).unwrap_or_else(|| "nothing".to_string())
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::definition::AssociationOptions;

    fn resolve(definitions: Vec<(&str, ModelDefinition)>) -> ModelResult<ResolvedAssociations> {
        let definitions: BTreeMap<String, ModelDefinition> =
            definitions.into_iter().map(|(name, def)| (name.to_string(), def)).collect();
        let config = SchemaConfig::default();
        AssociationResolver::new(&definitions, &config).resolve()
    }

    fn find<'a>(resolved: &'a ResolvedAssociations, model: &str, name: &str) -> &'a AssociationDescriptor {
        resolved[model].iter().find(|a| a.name == name).unwrap()
    }

    #[test]
    fn test_one_to_many_resolves_both_ways() {
        let resolved = resolve(vec![
            ("author", ModelDefinition::new().has_many("posts")),
            ("post", ModelDefinition::new().belongs_to("author")),
        ])
        .unwrap();

        let posts = find(&resolved, "author", "posts");
        let author = find(&resolved, "post", "author");
        assert_eq!(posts.foreign_key, "postIds");
        assert_eq!(author.foreign_key, "authorId");
        assert_eq!(posts.inverse_for("post"), Some("author"));
        assert_eq!(author.inverse_for("author"), Some("posts"));
    }

    #[test]
    fn test_named_belongs_to_key_is_not_singularized() {
        let resolved = resolve(vec![
            ("user", ModelDefinition::new().belongs_to_model("alias", "handle")),
            ("handle", ModelDefinition::new()),
        ])
        .unwrap();
        assert_eq!(find(&resolved, "user", "alias").foreign_key, "aliasId");
    }

    #[test]
    fn test_one_way_when_no_candidate() {
        let resolved = resolve(vec![
            ("author", ModelDefinition::new()),
            ("post", ModelDefinition::new().belongs_to("author")),
        ])
        .unwrap();
        assert!(!find(&resolved, "post", "author").has_inverse());
    }

    #[test]
    fn test_ambiguous_inverse_is_rejected() {
        let err = resolve(vec![
            ("user", ModelDefinition::new().has_many("posts")),
            (
                "post",
                ModelDefinition::new().belongs_to_model("author", "user").belongs_to_model("editor", "user"),
            ),
        ])
        .unwrap_err();

        assert!(matches!(err, ModelError::AmbiguousInverse { .. }));
    }

    #[test]
    fn test_explicit_inverse_disambiguates() {
        let resolved = resolve(vec![
            ("user", ModelDefinition::new().has_many_with("posts", AssociationOptions::new().inverse("author"))),
            (
                "post",
                ModelDefinition::new().belongs_to_model("author", "user").belongs_to_model("editor", "user"),
            ),
        ])
        .unwrap();

        assert_eq!(find(&resolved, "user", "posts").inverse_for("post"), Some("author"));
        assert_eq!(find(&resolved, "post", "author").inverse_for("user"), Some("posts"));
        assert!(!find(&resolved, "post", "editor").has_inverse());
    }

    #[test]
    fn test_explicit_inverse_must_exist() {
        let err = resolve(vec![
            ("user", ModelDefinition::new()),
            ("post", ModelDefinition::new().belongs_to_with("author", AssociationOptions::new().model("user").inverse("posts"))),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_conflicting_explicit_inverses_are_rejected() {
        let err = resolve(vec![
            (
                "user",
                ModelDefinition::new()
                    .has_many_with("posts", AssociationOptions::new().inverse("editor"))
                    .has_many_model("drafts", "post"),
            ),
            ("post", ModelDefinition::new().belongs_to_with("author", AssociationOptions::new().model("user").inverse("posts"))),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_disabled_inverse_is_one_way() {
        let resolved = resolve(vec![
            ("user", ModelDefinition::new().has_many_with("posts", AssociationOptions::new().no_inverse())),
            ("post", ModelDefinition::new().belongs_to_model("author", "user")),
        ])
        .unwrap();
        assert!(!find(&resolved, "user", "posts").has_inverse());
        assert!(!find(&resolved, "post", "author").has_inverse());
    }

    #[test]
    fn test_reflexive_self_inverse() {
        let resolved = resolve(vec![("user", ModelDefinition::new().has_many_model("friends", "user"))]).unwrap();
        let friends = find(&resolved, "user", "friends");
        assert!(friends.is_self_inverse());
        assert_eq!(friends.foreign_key, "friendIds");
    }

    #[test]
    fn test_reflexive_pair_needs_explicit_inverse() {
        let err = resolve(vec![(
            "node",
            ModelDefinition::new().belongs_to_model("parent", "node").has_many_model("children", "node"),
        )])
        .unwrap_err();
        assert!(matches!(err, ModelError::AmbiguousInverse { .. }));

        let resolved = resolve(vec![(
            "node",
            ModelDefinition::new()
                .belongs_to_with("parent", AssociationOptions::new().model("node").inverse("children"))
                .has_many_with("children", AssociationOptions::new().model("node").inverse("parent")),
        )])
        .unwrap();
        assert_eq!(find(&resolved, "node", "parent").inverse_for("node"), Some("children"));
        assert_eq!(find(&resolved, "node", "children").inverse_for("node"), Some("parent"));
    }

    #[test]
    fn test_polymorphic_inverse_per_type() {
        let resolved = resolve(vec![
            ("comment", ModelDefinition::new().belongs_to_with("commentable", AssociationOptions::new().polymorphic())),
            ("post", ModelDefinition::new().has_many("comments")),
            ("video", ModelDefinition::new().has_many("comments")),
            ("tag", ModelDefinition::new()),
        ])
        .unwrap();

        let commentable = find(&resolved, "comment", "commentable");
        assert_eq!(commentable.inverse_for("post"), Some("comments"));
        assert_eq!(commentable.inverse_for("video"), Some("comments"));
        assert_eq!(commentable.inverse_for("tag"), None);
        assert_eq!(commentable.inverse_for("comment"), None);
        assert_eq!(find(&resolved, "post", "comments").inverse_for("comment"), Some("commentable"));
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let err = resolve(vec![("post", ModelDefinition::new().belongs_to("author"))]).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_foreign_key_collisions_are_rejected() {
        let err = resolve(vec![
            ("tag", ModelDefinition::new()),
            ("post", ModelDefinition::new().has_many("tags").attribute("tagIds", "x")),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let definitions: BTreeMap<String, ModelDefinition> = vec![
            ("author".to_string(), ModelDefinition::new().has_many("posts")),
            ("post".to_string(), ModelDefinition::new().belongs_to("author")),
        ]
        .into_iter()
        .collect();
        let config = SchemaConfig::default();

        let first = AssociationResolver::new(&definitions, &config).resolve().unwrap();
        let second = AssociationResolver::new(&definitions, &config).resolve().unwrap();
        assert_eq!(first, second);
    }
}
