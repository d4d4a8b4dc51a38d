//! Relationships Module - association declarations, inverse resolution and foreign key sync

pub mod definition;
pub mod inference;
pub mod metadata;
pub mod registry;
pub mod sync;

// Re-export main types
pub use definition::*;
pub use inference::*;
pub use metadata::*;
pub use registry::*;
pub use sync::*;
