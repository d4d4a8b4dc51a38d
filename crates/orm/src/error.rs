//! Error types for the ORM system
//!
//! Every error is a programmer or configuration error raised synchronously at
//! the call that triggers it. None are retried or recovered internally.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// More than one association qualifies as the inverse of another
    #[error("The {target} model has multiple possible inverse associations for the {association} association on the {model} model")]
    AmbiguousInverse {
        model: String,
        association: String,
        target: String,
    },

    /// An identity manager was asked to register an id it already handed out.
    /// Managers leave `collection` empty; the owning collection fills it in.
    #[error("ID '{id}' has already been used{}", in_collection(.collection))]
    DuplicateId { collection: String, id: String },

    /// A batch lookup by ids matched a different number of records
    #[error("Couldn't find all {collection} with ids {ids:?}: expected {expected} record(s), found {found}")]
    CountMismatch {
        collection: String,
        ids: Vec<String>,
        expected: usize,
        found: usize,
    },

    /// An association was given a value of the wrong declared type
    #[error("Type mismatch on {model}.{association}: {message}")]
    TypeMismatch {
        model: String,
        association: String,
        message: String,
    },

    /// A model type name with no registered definition
    #[error("Model '{0}' is not registered with the schema")]
    UnregisteredType(String),

    /// A model type has no association with the given name
    #[error("Model '{model}' has no association named '{association}'")]
    UnknownAssociation { model: String, association: String },

    /// Record not found in a collection
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid model definition or schema configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    pub(crate) fn type_mismatch(model: &str, association: &str, message: impl Into<String>) -> Self {
        ModelError::TypeMismatch {
            model: model.to_string(),
            association: association.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown_association(model: &str, association: &str) -> Self {
        ModelError::UnknownAssociation {
            model: model.to_string(),
            association: association.to_string(),
        }
    }

    /// Whether this error was raised while registering model definitions
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            ModelError::AmbiguousInverse { .. } | ModelError::Configuration(_)
        )
    }
}

fn in_collection(collection: &str) -> String {
    if collection.is_empty() {
        String::new()
    } else {
        format!(" in collection '{}'", collection)
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
