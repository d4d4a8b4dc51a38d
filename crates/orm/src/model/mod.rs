//! Model System - instances and collections over the record store
//!
//! - `instance`: the [`Model`] handle and its attribute access
//! - `associations`: reading and assigning related instances
//! - `lifecycle`: save, reload and destroy
//! - `collection`: ordered [`Collection`]s of instances

pub mod associations;
pub mod collection;
pub mod instance;
pub mod lifecycle;

// Re-export main types
pub use collection::Collection;
pub use instance::Model;
