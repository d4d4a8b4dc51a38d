//! Record Store - named collections of plain attribute records

pub mod collection;
pub mod identity;
pub mod record;

use std::collections::BTreeMap;

pub use collection::*;
pub use identity::*;
pub use record::*;

use crate::error::{ModelError, ModelResult};

/// In-memory database: a set of named record collections
#[derive(Debug, Default)]
pub struct Db {
    collections: BTreeMap<String, DbCollection>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection with a sequential identity manager. Creating an
    /// existing collection leaves it untouched.
    pub fn create_collection(&mut self, name: &str) -> &mut DbCollection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| DbCollection::new(name))
    }

    /// Create a collection backed by the given identity manager
    pub fn create_collection_with(
        &mut self,
        name: &str,
        identity_manager: SharedIdentityManager,
    ) -> &mut DbCollection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| DbCollection::with_identity_manager(name, identity_manager))
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection(&self, name: &str) -> ModelResult<&DbCollection> {
        self.collections
            .get(name)
            .ok_or_else(|| ModelError::NotFound(format!("collection '{}'", name)))
    }

    pub fn collection_mut(&mut self, name: &str) -> ModelResult<&mut DbCollection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| ModelError::NotFound(format!("collection '{}'", name)))
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Bulk-load pre-existing records, creating the collection if needed.
    /// Ids are normalized and registered so later generated ids never collide.
    pub fn load_data<I, A>(&mut self, name: &str, records: I) -> ModelResult<Vec<Record>>
    where
        I: IntoIterator<Item = A>,
        A: IntoAttrs,
    {
        let loaded = self.create_collection(name).insert_many(records)?;
        tracing::debug!("Loaded {} record(s) into '{}'", loaded.len(), name);
        Ok(loaded)
    }

    /// Read-only snapshot of every collection
    pub fn dump(&self) -> BTreeMap<String, Vec<Record>> {
        self.collections
            .iter()
            .map(|(name, collection)| (name.clone(), collection.all()))
            .collect()
    }

    /// Empty every collection, keeping the collections themselves
    pub fn empty_data(&mut self) {
        for collection in self.collections.values_mut() {
            collection.clear();
        }
    }
}
