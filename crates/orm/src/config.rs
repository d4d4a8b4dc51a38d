//! Schema configuration

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::inflection::{CollectionNaming, ForeignKeyConvention};

/// Schema configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// How record collections are named from model types
    pub collection_naming: CollectionNaming,
    /// How foreign key attributes are named from associations
    pub foreign_key_convention: ForeignKeyConvention,
    /// Reject raw foreign keys whose record does not exist at assignment time
    pub strict_foreign_keys: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            collection_naming: CollectionNaming::Plural,
            foreign_key_convention: ForeignKeyConvention::CamelCase,
            strict_foreign_keys: false,
        }
    }
}

impl SchemaConfig {
    /// Load configuration from `ELIF_ORM_*` environment variables, falling
    /// back to defaults for anything unset
    pub fn from_env() -> ModelResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var("ELIF_ORM_COLLECTION_NAMING") {
            config.collection_naming = match value.to_lowercase().as_str() {
                "plural" => CollectionNaming::Plural,
                "singular" => CollectionNaming::Singular,
                other => {
                    return Err(ModelError::Configuration(format!(
                        "ELIF_ORM_COLLECTION_NAMING must be 'plural' or 'singular', got '{}'",
                        other
                    )))
                }
            };
        }

        if let Ok(value) = env::var("ELIF_ORM_FOREIGN_KEYS") {
            config.foreign_key_convention = match value.to_lowercase().as_str() {
                "camel" | "camel_case" => ForeignKeyConvention::CamelCase,
                "underscore" | "snake" | "snake_case" => ForeignKeyConvention::Underscore,
                other => {
                    return Err(ModelError::Configuration(format!(
                        "ELIF_ORM_FOREIGN_KEYS must be 'camel_case' or 'underscore', got '{}'",
                        other
                    )))
                }
            };
        }

        if let Ok(value) = env::var("ELIF_ORM_STRICT_FOREIGN_KEYS") {
            config.strict_foreign_keys = value.parse::<bool>().map_err(|_| {
                ModelError::Configuration(format!(
                    "ELIF_ORM_STRICT_FOREIGN_KEYS must be 'true' or 'false', got '{}'",
                    value
                ))
            })?;
        }

        Ok(config)
    }

    /// Parse configuration from a JSON document
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchemaConfig::default();
        assert_eq!(config.collection_naming, CollectionNaming::Plural);
        assert_eq!(config.foreign_key_convention, ForeignKeyConvention::CamelCase);
        assert!(!config.strict_foreign_keys);
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config = SchemaConfig::from_json(r#"{ "foreign_key_convention": "underscore" }"#).unwrap();
        assert_eq!(config.foreign_key_convention, ForeignKeyConvention::Underscore);
        assert_eq!(config.collection_naming, CollectionNaming::Plural);
    }

    #[test]
    fn test_config_from_json_rejects_unknown_convention() {
        let result = SchemaConfig::from_json(r#"{ "collection_naming": "shouting" }"#);
        assert!(matches!(result, Err(ModelError::Serialization(_))));
    }
}
