//! Model instances - handles over one record of one registered type
//!
//! An unsaved instance holds all of its attributes in memory. A persisted
//! instance reads through to its record and only keeps attribute changes
//! staged for the next `save()`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::db::{Attrs, IntoAttrs, RecordId};
use crate::error::{ModelError, ModelResult};
use crate::relationships::{ModelEntry, ModelRef};
use crate::schema::Schema;

/// Mutable state shared by every clone of one instance
pub(crate) struct ModelState {
    pub(crate) id: Option<RecordId>,
    /// Unsaved: every attribute. Persisted: staged changes only.
    pub(crate) attrs: Attrs,
    /// Unsaved related instances per association, written on save
    pub(crate) pending: BTreeMap<String, Vec<PendingLink>>,
    pub(crate) saving: bool,
}

/// A related instance waiting for an id
pub(crate) enum PendingLink {
    Owned(Model),
    /// Points back at the instance that created this one
    Back(WeakModel),
}

impl PendingLink {
    pub(crate) fn upgrade(&self) -> Option<Model> {
        match self {
            PendingLink::Owned(model) => Some(model.clone()),
            PendingLink::Back(weak) => weak.upgrade(),
        }
    }

    pub(crate) fn is(&self, model: &Model) -> bool {
        match self {
            PendingLink::Owned(owned) => owned.ptr_eq(model),
            PendingLink::Back(weak) => Weak::ptr_eq(&weak.state, &Rc::downgrade(&model.state)),
        }
    }
}

pub(crate) struct WeakModel {
    schema: Schema,
    model: Rc<str>,
    state: Weak<RefCell<ModelState>>,
}

impl WeakModel {
    fn upgrade(&self) -> Option<Model> {
        self.state.upgrade().map(|state| Model {
            schema: self.schema.clone(),
            model: self.model.clone(),
            state,
        })
    }
}

/// One record of one registered model type
#[derive(Clone)]
pub struct Model {
    pub(crate) schema: Schema,
    model: Rc<str>,
    pub(crate) state: Rc<RefCell<ModelState>>,
}

impl Model {
    pub(crate) fn unsaved(schema: Schema, model: &str, attrs: Attrs) -> Self {
        Self::with_state(schema, model, None, attrs)
    }

    pub(crate) fn persisted(schema: Schema, model: &str, id: RecordId) -> Self {
        Self::with_state(schema, model, Some(id), Attrs::new())
    }

    fn with_state(schema: Schema, model: &str, id: Option<RecordId>, attrs: Attrs) -> Self {
        Self {
            schema,
            model: Rc::from(model),
            state: Rc::new(RefCell::new(ModelState {
                id,
                attrs,
                pending: BTreeMap::new(),
                saving: false,
            })),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// The record id, once the instance has been saved
    pub fn id(&self) -> Option<RecordId> {
        self.state.borrow().id.clone()
    }

    /// `{type, id}` reference to this instance, once saved
    pub fn model_ref(&self) -> Option<ModelRef> {
        self.id().map(|id| ModelRef::new(self.model_name(), id))
    }

    /// Whether a record with this instance's id is stored
    pub fn is_saved(&self) -> bool {
        match self.id() {
            Some(id) => self.schema.record(&self.model, &id).is_some(),
            None => false,
        }
    }

    pub fn is_new(&self) -> bool {
        !self.is_saved()
    }

    /// Current value of one attribute, staged changes included
    pub fn attr(&self, key: &str) -> Option<Value> {
        let id = {
            let state = self.state.borrow();
            if let Some(value) = state.attrs.get(key) {
                return Some(value.clone());
            }
            state.id.clone()?
        };
        self.schema.record(&self.model, &id)?.get(key).cloned()
    }

    /// Snapshot of every attribute, staged changes included
    pub fn attrs(&self) -> Attrs {
        let (id, staged) = {
            let state = self.state.borrow();
            (state.id.clone(), state.attrs.clone())
        };
        let Some(id) = id else {
            return staged;
        };

        let mut attrs = self.schema.record(&self.model, &id).unwrap_or_else(|| {
            let mut attrs = Attrs::new();
            attrs.insert("id".to_string(), id.to_value());
            attrs
        });
        for (key, value) in staged {
            attrs.insert(key, value);
        }
        attrs
    }

    /// Set one attribute in memory. Foreign key attributes are assigned
    /// through their association immediately.
    pub fn set_attr(&self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        let entry = self.schema.registry().model(&self.model)?;
        self.check_attr(entry, key, &value)?;

        if key == "id" {
            self.set_id(RecordId::from_value(&value));
            return Ok(());
        }
        if let Some(association) = entry.association_for_key(key) {
            let name = association.name.clone();
            return self.set_foreign_key(&name, value);
        }

        self.state.borrow_mut().attrs.insert(key.to_string(), value);
        Ok(())
    }

    /// Set several attributes, then save. Every key is checked before any
    /// of them is applied.
    pub fn update(&self, attrs: impl IntoAttrs) -> ModelResult<()> {
        let attrs = attrs.into_attrs()?;
        let entry = self.schema.registry().model(&self.model)?;
        for (key, value) in &attrs {
            self.check_attr(entry, key, value)?;
        }

        for (key, value) in attrs {
            self.set_attr(&key, value)?;
        }
        self.save()
    }

    /// Set one attribute, then save
    pub fn update_attr(&self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.set_attr(key, value)?;
        self.save()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attrs())
    }

    /// Both handles share the same in-memory state
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn downgrade(&self) -> WeakModel {
        WeakModel {
            schema: self.schema.clone(),
            model: self.model.clone(),
            state: Rc::downgrade(&self.state),
        }
    }

    /// Whether a pending link of this instance keeps `other` alive
    pub(crate) fn holds_owned(&self, other: &Model) -> bool {
        self.state
            .borrow()
            .pending
            .values()
            .flatten()
            .any(|link| matches!(link, PendingLink::Owned(model) if model.ptr_eq(other)))
    }

    pub(crate) fn is_saving(&self) -> bool {
        self.state.borrow().saving
    }

    /// Fail the way `set_attr(key, value)` would, without changing anything
    fn check_attr(&self, entry: &ModelEntry, key: &str, value: &Value) -> ModelResult<()> {
        if key == "id" {
            return self.check_id(value);
        }
        if let Some(association) = entry.association_for_key(key) {
            let refs = association.refs_from_value(value)?;
            return self.schema.check_refs(association, &refs);
        }
        if let Some(association) = entry.association(key) {
            return Err(association.mismatch(format!(
                "assign '{}' with set_related, or set '{}' instead",
                key, association.foreign_key
            )));
        }
        Ok(())
    }

    fn check_id(&self, value: &Value) -> ModelResult<()> {
        let id = RecordId::from_value(value);
        if id.is_none() && !value.is_null() {
            return Err(ModelError::Serialization(format!("invalid record id {}", value)));
        }
        let current = self.id();
        match current {
            Some(current) if id.as_ref() != Some(&current) => Err(ModelError::Configuration(format!(
                "id of {}({}) is immutable",
                self.model, current
            ))),
            _ => Ok(()),
        }
    }

    fn set_id(&self, id: Option<RecordId>) {
        let mut state = self.state.borrow_mut();
        if state.id.is_some() {
            return;
        }
        match id {
            Some(id) => {
                state.attrs.insert("id".to_string(), id.to_value());
            }
            None => {
                state.attrs.remove("id");
            }
        }
    }
}

impl PartialEq for Model {
    /// Same instance, or the same stored record
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.model_ref(), other.model_ref()) {
            (Some(a), Some(b)) => a == b && self.schema == other.schema,
            _ => false,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "model:{}({})", self.model, id),
            None => write!(f, "model:{}(new)", self.model),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("model", &self.model)
            .field("id", &self.id())
            .field("attrs", &self.attrs())
            .finish()
    }
}
