//! # elif-memory-orm: In-Memory ORM for elif.rs
//!
//! An in-process record store with a schema and association engine on top.
//! Model types declare attributes and associations (belongsTo / hasMany,
//! optionally polymorphic); the engine resolves inverses once when the
//! schema is built and keeps the foreign keys on both sides of every
//! two-way association in agreement as instances are saved, reassigned and
//! destroyed.
//!
//! ```
//! use elif_memory_orm::{ModelDefinition, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new(vec![
//!     ("author", ModelDefinition::new().has_many("posts")),
//!     ("post", ModelDefinition::new().belongs_to("author")),
//! ])?;
//!
//! let author = schema.create("author", json!({ "name": "Zelda" }))?;
//! let post = author.create_related("posts", json!({ "title": "Hello" }))?;
//! assert_eq!(post.attr("authorId"), Some(json!("1")));
//! # Ok::<(), elif_memory_orm::ModelError>(())
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod inflection;
pub mod model;
pub mod relationships;
pub mod schema;


// Re-export core types
pub use config::SchemaConfig;
pub use db::{
    Attrs, CounterIdentityManager, Db, DbCollection, IdentityManager, IdentityManagerFactory, IntoAttrs, Query,
    Record, RecordId, SharedIdentityManager, UuidIdentityManager,
};
pub use error::*;
pub use inflection::{CollectionNaming, ForeignKeyConvention};
pub use model::{Collection, Model};
pub use relationships::{
    AssociationDescriptor, AssociationKind, AssociationOptions, AssociationTarget, InverseOption, ModelDefinition,
    ModelRef,
};
pub use schema::{Schema, SchemaBuilder};
