//! Record collections - named sets of plain attribute records
//!
//! Every read hands out a copy. The only way to change a stored record is
//! through a collection operation.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use super::identity::{CounterIdentityManager, SharedIdentityManager};
use super::record::{Attrs, IntoAttrs, Query, Record, RecordId};
use crate::error::{ModelError, ModelResult};

/// A named collection of records with its identity manager
pub struct DbCollection {
    name: String,
    records: Vec<Record>,
    identity_manager: SharedIdentityManager,
}

impl fmt::Debug for DbCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCollection")
            .field("name", &self.name)
            .field("records", &self.records.len())
            .finish()
    }
}

impl DbCollection {
    /// Create an empty collection with a sequential identity manager
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_identity_manager(name, CounterIdentityManager::shared())
    }

    pub fn with_identity_manager(name: impl Into<String>, identity_manager: SharedIdentityManager) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            identity_manager,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn identity_manager(&self) -> SharedIdentityManager {
        self.identity_manager.clone()
    }

    /// Swap in another identity manager and register every stored id with it
    pub fn replace_identity_manager(&mut self, identity_manager: SharedIdentityManager) -> ModelResult<()> {
        {
            let mut manager = identity_manager.borrow_mut();
            for id in self.records.iter().filter_map(RecordId::of) {
                manager.set(&id).map_err(|err| self.scope_error(err))?;
            }
        }
        self.identity_manager = identity_manager;
        Ok(())
    }

    /// Copies of every record, in insertion order
    pub fn all(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Insert one record, assigning an id when it carries none
    pub fn insert(&mut self, record: impl IntoAttrs) -> ModelResult<Record> {
        let attrs = record.into_attrs()?;
        let id = self.claim_id(&attrs)?;
        let stored = with_id(attrs, &id);

        tracing::trace!("Inserted {}({})", self.name, id);
        self.records.push(stored.clone());
        Ok(stored)
    }

    /// Insert several records. Explicit ids are registered before any id is
    /// generated, and nothing is stored unless every record gets an id.
    pub fn insert_many<I, A>(&mut self, records: I) -> ModelResult<Vec<Record>>
    where
        I: IntoIterator<Item = A>,
        A: IntoAttrs,
    {
        let batch = records
            .into_iter()
            .map(IntoAttrs::into_attrs)
            .collect::<ModelResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let mut explicit = Vec::with_capacity(batch.len());
        for attrs in &batch {
            let id = explicit_id(attrs)?;
            if let Some(id) = &id {
                if self.contains(id) || !seen.insert(id.clone()) {
                    return Err(self.duplicate(id));
                }
            }
            explicit.push(id);
        }

        {
            let mut manager = self.identity_manager.borrow_mut();
            for id in explicit.iter().flatten() {
                manager.set(id).map_err(|err| self.scope_error(err))?;
            }
        }

        let mut ids = Vec::with_capacity(batch.len());
        for (attrs, id) in batch.iter().zip(explicit) {
            let id = match id {
                Some(id) => id,
                None => self
                    .identity_manager
                    .borrow_mut()
                    .fetch(attrs)
                    .map_err(|err| self.scope_error(err))?,
            };
            ids.push(id);
        }

        let stored: Vec<Record> = batch
            .into_iter()
            .zip(&ids)
            .map(|(attrs, id)| with_id(attrs, id))
            .collect();
        tracing::trace!("Inserted {} record(s) into {}", stored.len(), self.name);
        self.records.extend(stored.iter().cloned());
        Ok(stored)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    /// Find a record by id
    pub fn find(&self, id: impl Into<RecordId>) -> Option<Record> {
        let id = id.into();
        self.position(&id).map(|idx| self.records[idx].clone())
    }

    /// Find records by id, in the order requested. Every id must match.
    pub fn find_many<I, K>(&self, ids: I) -> ModelResult<Vec<Record>>
    where
        I: IntoIterator<Item = K>,
        K: Into<RecordId>,
    {
        let ids: Vec<RecordId> = ids.into_iter().map(Into::into).collect();
        let found: Vec<Record> = ids.iter().filter_map(|id| self.find(id)).collect();

        if found.len() != ids.len() {
            return Err(ModelError::CountMismatch {
                collection: self.name.clone(),
                ids: ids.iter().map(ToString::to_string).collect(),
                expected: ids.len(),
                found: found.len(),
            });
        }
        Ok(found)
    }

    /// First record matching the query
    pub fn find_by(&self, query: impl Into<Query>) -> Option<Record> {
        let query = query.into();
        self.records.iter().find(|r| query.matches(r)).cloned()
    }

    /// Every record matching the query; no match is an empty result
    pub fn where_(&self, query: impl Into<Query>) -> Vec<Record> {
        let query = query.into();
        let matches: Vec<Record> = self.records.iter().filter(|r| query.matches(r)).cloned().collect();
        if matches.is_empty() {
            tracing::trace!("No {} matched {:?}", self.name, query);
        }
        matches
    }

    /// First record matching `attrs`, or a new one built from them
    pub fn first_or_create(&mut self, attrs: impl IntoAttrs) -> ModelResult<Record> {
        let attrs = attrs.into_attrs()?;
        match self.find_by(Query::Attrs(attrs.clone())) {
            Some(record) => Ok(record),
            None => self.insert(attrs),
        }
    }

    /// Merge `patch` into every record selected by `target`
    pub fn update(&mut self, target: impl Into<Query>, patch: impl IntoAttrs) -> ModelResult<Vec<Record>> {
        let target = target.into();
        let mut patch = patch.into_attrs()?;

        if let Some(id) = patch.remove("id") {
            let unchanged = match &target {
                Query::Id(target_id) => RecordId::from_value(&id).as_ref() == Some(target_id),
                _ => false,
            };
            if !unchanged {
                return Err(ModelError::Configuration(format!(
                    "record ids in '{}' are immutable",
                    self.name
                )));
            }
        }

        if let Query::Id(id) = &target {
            if !self.contains(id) {
                return Err(ModelError::NotFound(format!("{}({})", self.name, id)));
            }
        }

        let mut updated = Vec::new();
        for record in self.records.iter_mut().filter(|r| target.matches(r)) {
            for (key, value) in &patch {
                record.insert(key.clone(), value.clone());
            }
            updated.push(record.clone());
        }
        Ok(updated)
    }

    /// Set one attribute on one record. Missing records are skipped.
    pub(crate) fn set_attr(&mut self, id: &RecordId, key: &str, value: Value) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.records[idx].insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Remove the records selected by `target`, returning them
    pub fn remove(&mut self, target: impl Into<Query>) -> Vec<Record> {
        let target = target.into();
        let (removed, kept): (Vec<Record>, Vec<Record>) =
            std::mem::take(&mut self.records).into_iter().partition(|r| target.matches(r));
        self.records = kept;
        removed
    }

    /// Drop every record and forget every issued id
    pub fn clear(&mut self) {
        self.records.clear();
        self.identity_manager.borrow_mut().reset();
    }

    pub(crate) fn records(&self) -> &[Record] {
        &self.records
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| RecordId::of(r).as_ref() == Some(id))
    }

    fn claim_id(&mut self, attrs: &Attrs) -> ModelResult<RecordId> {
        match explicit_id(attrs)? {
            Some(id) => {
                if self.contains(&id) {
                    return Err(self.duplicate(&id));
                }
                self.identity_manager
                    .borrow_mut()
                    .set(&id)
                    .map_err(|err| self.scope_error(err))?;
                Ok(id)
            }
            None => self
                .identity_manager
                .borrow_mut()
                .fetch(attrs)
                .map_err(|err| self.scope_error(err)),
        }
    }

    fn duplicate(&self, id: &RecordId) -> ModelError {
        ModelError::DuplicateId {
            collection: self.name.clone(),
            id: id.to_string(),
        }
    }

    fn scope_error(&self, err: ModelError) -> ModelError {
        match err {
            ModelError::DuplicateId { id, .. } => ModelError::DuplicateId {
                collection: self.name.clone(),
                id,
            },
            other => other,
        }
    }
}

fn explicit_id(attrs: &Attrs) -> ModelResult<Option<RecordId>> {
    match attrs.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => RecordId::from_value(value)
            .map(Some)
            .ok_or_else(|| ModelError::Serialization(format!("invalid record id {}", value))),
    }
}

// id first, then the remaining attributes in their original order
fn with_id(attrs: Attrs, id: &RecordId) -> Record {
    let mut record = Record::new();
    record.insert("id".to_string(), id.to_value());
    for (key, value) in attrs {
        if key != "id" {
            record.insert(key, value);
        }
    }
    record
}
