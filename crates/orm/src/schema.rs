//! Schema - registered model types over one record store
//!
//! A [`Schema`] is built from a closed set of [`ModelDefinition`]s. Building
//! resolves every association inverse, creates one collection per model type
//! and wires identity managers. The resulting handle is cheap to clone; every
//! model instance keeps one.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::config::SchemaConfig;
use crate::db::{
    Db, IdentityManagerFactory, IntoAttrs, Query, Record, RecordId, SharedIdentityManager,
};
use crate::error::{ModelError, ModelResult};
use crate::model::{Collection, Model};
use crate::relationships::{AssociationDescriptor, AssociationRegistry, ForeignKeySync, ModelDefinition};

/// Builder for [`Schema`]
#[derive(Default)]
pub struct SchemaBuilder {
    definitions: BTreeMap<String, ModelDefinition>,
    config: SchemaConfig,
    identity_managers: BTreeMap<String, SharedIdentityManager>,
    application_identity_manager: Option<IdentityManagerFactory>,
    db: Option<Db>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type. Registering the same name twice keeps the
    /// last definition.
    pub fn model(mut self, name: impl Into<String>, definition: ModelDefinition) -> Self {
        self.definitions.insert(name.into(), definition);
        self
    }

    pub fn models<I, N>(mut self, definitions: I) -> Self
    where
        I: IntoIterator<Item = (N, ModelDefinition)>,
        N: Into<String>,
    {
        for (name, definition) in definitions {
            self.definitions.insert(name.into(), definition);
        }
        self
    }

    pub fn config(mut self, config: SchemaConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific identity manager for one model type. The manager is
    /// reset when the schema is built.
    pub fn identity_manager(mut self, model: impl Into<String>, manager: SharedIdentityManager) -> Self {
        self.identity_managers.insert(model.into(), manager);
        self
    }

    /// Build identity managers for every type without its own override
    pub fn application_identity_manager(mut self, factory: IdentityManagerFactory) -> Self {
        self.application_identity_manager = Some(factory);
        self
    }

    /// Build over an existing record store instead of an empty one
    pub fn db(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }

    pub fn build(self) -> ModelResult<Schema> {
        let registry = AssociationRegistry::from_definitions(&self.definitions, &self.config)?;

        for model in self.identity_managers.keys() {
            registry.model(model)?;
        }

        let mut db = self.db.unwrap_or_default();
        let mut reset: HashSet<*const ()> = HashSet::new();
        for entry in registry.models() {
            let manager = match self.identity_managers.get(&entry.name) {
                Some(manager) => Some(manager.clone()),
                None => self.application_identity_manager.as_ref().map(|factory| factory()),
            };

            match manager {
                Some(manager) => {
                    // a manager shared by several types is reset only once
                    if reset.insert(Rc::as_ptr(&manager) as *const ()) {
                        manager.borrow_mut().reset();
                    }
                    if db.has_collection(&entry.collection) {
                        db.collection_mut(&entry.collection)?.replace_identity_manager(manager)?;
                    } else {
                        db.create_collection_with(&entry.collection, manager);
                    }
                }
                None => {
                    db.create_collection(&entry.collection);
                }
            }
        }

        tracing::debug!(
            "Built schema with {} model type(s): {}",
            registry.model_names().len(),
            registry.model_names().join(", ")
        );

        Ok(Schema {
            inner: Rc::new(SchemaInner {
                db: RefCell::new(db),
                registry,
                config: self.config,
            }),
        })
    }
}

struct SchemaInner {
    db: RefCell<Db>,
    registry: AssociationRegistry,
    config: SchemaConfig,
}

/// Registered model types plus their record store
#[derive(Clone)]
pub struct Schema {
    inner: Rc<SchemaInner>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("models", &self.inner.registry.model_names())
            .finish()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Build a schema with default configuration
    pub fn new<I, N>(definitions: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = (N, ModelDefinition)>,
        N: Into<String>,
    {
        SchemaBuilder::new().models(definitions).build()
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &AssociationRegistry {
        &self.inner.registry
    }

    pub fn model_names(&self) -> Vec<String> {
        self.inner.registry.model_names()
    }

    pub fn associations_for(&self, model: &str) -> ModelResult<BTreeMap<String, AssociationDescriptor>> {
        self.inner.registry.associations_for(model)
    }

    pub fn collection_name(&self, model: &str) -> ModelResult<String> {
        Ok(self.inner.registry.collection_name(model)?.to_string())
    }

    /// Borrow the record store. The borrow must be released before calling
    /// any model or schema operation.
    pub fn db(&self) -> Ref<'_, Db> {
        self.inner.db.borrow()
    }

    /// Mutably borrow the record store. Writes made here bypass foreign key
    /// synchronization.
    pub fn db_mut(&self) -> RefMut<'_, Db> {
        self.inner.db.borrow_mut()
    }

    /// Build an unsaved instance. Attributes start from the declared
    /// defaults and every foreign key starts empty.
    pub fn new_model(&self, model: &str, attrs: impl IntoAttrs) -> ModelResult<Model> {
        let entry = self.inner.registry.model(model)?;
        let given = attrs.into_attrs()?;

        let mut attrs = entry.attributes.clone();
        for association in &entry.associations {
            attrs.insert(association.foreign_key.clone(), association.empty_value());
        }

        for (key, value) in given {
            if key == "id" {
                match RecordId::from_value(&value) {
                    Some(id) => {
                        attrs.insert(key, id.to_value());
                    }
                    None if value.is_null() => {}
                    None => return Err(ModelError::Serialization(format!("invalid record id {}", value))),
                }
            } else if let Some(association) = entry.association_for_key(&key) {
                let refs = association.refs_from_value(&value)?;
                self.check_refs(association, &refs)?;
                attrs.insert(key, association.value_from_refs(&refs));
            } else if let Some(association) = entry.association(&key) {
                return Err(association.mismatch(format!(
                    "assign '{}' with set_related, or set '{}' instead",
                    key, association.foreign_key
                )));
            } else {
                attrs.insert(key, value);
            }
        }

        Ok(Model::unsaved(self.clone(), &entry.name, attrs))
    }

    /// Build and save an instance
    pub fn create(&self, model: &str, attrs: impl IntoAttrs) -> ModelResult<Model> {
        let instance = self.new_model(model, attrs)?;
        instance.save()?;
        Ok(instance)
    }

    pub fn all(&self, model: &str) -> ModelResult<Collection> {
        self.where_(model, Query::All)
    }

    /// An empty collection of the given type
    pub fn none(&self, model: &str) -> ModelResult<Collection> {
        self.inner.registry.model(model)?;
        Ok(Collection::new(model, Vec::new()))
    }

    /// Find by id. A missing record is `None`.
    pub fn find(&self, model: &str, id: impl Into<RecordId>) -> ModelResult<Option<Model>> {
        let record = self.with_collection(model, |collection| collection.find(id))?;
        Ok(record.and_then(|record| self.instantiate(model, &record)))
    }

    /// Find every id, in the order given. Fails unless all of them exist.
    pub fn find_many<I, K>(&self, model: &str, ids: I) -> ModelResult<Collection>
    where
        I: IntoIterator<Item = K>,
        K: Into<RecordId>,
    {
        let records = self.with_collection(model, |collection| collection.find_many(ids))??;
        Ok(self.collect(model, &records))
    }

    pub fn find_by(&self, model: &str, query: impl Into<Query>) -> ModelResult<Option<Model>> {
        let record = self.with_collection(model, |collection| collection.find_by(query))?;
        Ok(record.and_then(|record| self.instantiate(model, &record)))
    }

    /// The first instance matching `attrs`, or a new saved one built from them
    pub fn find_or_create_by(&self, model: &str, attrs: impl IntoAttrs) -> ModelResult<Model> {
        let attrs = attrs.into_attrs()?;
        match self.find_by(model, Query::Attrs(attrs.clone()))? {
            Some(found) => Ok(found),
            None => self.create(model, attrs),
        }
    }

    pub fn where_(&self, model: &str, query: impl Into<Query>) -> ModelResult<Collection> {
        let records = self.with_collection(model, |collection| collection.where_(query))?;
        Ok(self.collect(model, &records))
    }

    pub fn first(&self, model: &str) -> ModelResult<Option<Model>> {
        self.find_by(model, Query::All)
    }

    /// Bulk-load records into a collection, bypassing models
    pub fn load_data<I, A>(&self, collection: &str, records: I) -> ModelResult<Vec<Record>>
    where
        I: IntoIterator<Item = A>,
        A: IntoAttrs,
    {
        self.inner.db.borrow_mut().load_data(collection, records)
    }

    pub fn dump(&self) -> BTreeMap<String, Vec<Record>> {
        self.inner.db.borrow().dump()
    }

    pub fn empty_data(&self) {
        self.inner.db.borrow_mut().empty_data();
    }

    /// Copy of one stored record
    pub(crate) fn record(&self, model: &str, id: &RecordId) -> Option<Record> {
        self.with_collection(model, |collection| collection.find(id)).ok().flatten()
    }

    /// Run `f` with foreign key synchronization over the store
    pub(crate) fn sync<R>(&self, f: impl FnOnce(&mut ForeignKeySync<'_>) -> ModelResult<R>) -> ModelResult<R> {
        let mut db = self.inner.db.borrow_mut();
        let mut sync = ForeignKeySync::new(&mut *db, &self.inner.registry);
        f(&mut sync)
    }

    pub(crate) fn with_collection<R>(
        &self,
        model: &str,
        f: impl FnOnce(&crate::db::DbCollection) -> R,
    ) -> ModelResult<R> {
        let name = self.inner.registry.collection_name(model)?;
        let db = self.inner.db.borrow();
        Ok(f(db.collection(name)?))
    }

    pub(crate) fn with_collection_mut<R>(
        &self,
        model: &str,
        f: impl FnOnce(&mut crate::db::DbCollection) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let name = self.inner.registry.collection_name(model)?;
        let mut db = self.inner.db.borrow_mut();
        f(db.collection_mut(name)?)
    }

    /// Type and, when strict, existence checks for references about to be stored
    pub(crate) fn check_refs(
        &self,
        association: &AssociationDescriptor,
        refs: &[crate::relationships::ModelRef],
    ) -> ModelResult<()> {
        for model_ref in refs {
            association.check_model(&model_ref.model)?;
            if !self.inner.registry.has_model(&model_ref.model) {
                return Err(ModelError::UnregisteredType(model_ref.model.clone()));
            }
            if self.inner.config.strict_foreign_keys && self.record(&model_ref.model, &model_ref.id).is_none() {
                return Err(ModelError::NotFound(model_ref.to_string()));
            }
        }
        Ok(())
    }

    fn instantiate(&self, model: &str, record: &Record) -> Option<Model> {
        RecordId::of(record).map(|id| Model::persisted(self.clone(), model, id))
    }

    fn collect(&self, model: &str, records: &[Record]) -> Collection {
        let models = records.iter().filter_map(|record| self.instantiate(model, record)).collect();
        Collection::new(model, models)
    }
}
