//! Identity Managers - id assignment for record collections
//!
//! One manager instance serves one collection. Managers may be shared
//! between schemas built from the same definitions, so every manager must be
//! able to forget all of its state through [`IdentityManager::reset`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Debug;
use std::rc::Rc;

use uuid::Uuid;

use super::record::{Attrs, RecordId};
use crate::error::{ModelError, ModelResult};

/// Issues and tracks the ids of one collection
pub trait IdentityManager: Debug {
    /// Return a fresh, unused id. `attrs` are the attributes of the record
    /// about to be inserted, for managers that derive keys from content.
    fn fetch(&mut self, attrs: &Attrs) -> ModelResult<RecordId>;

    /// Register an externally supplied id
    fn set(&mut self, id: &RecordId) -> ModelResult<()>;

    /// Forget every tracked id
    fn reset(&mut self);
}

/// An identity manager instance that may be reused across schemas
pub type SharedIdentityManager = Rc<RefCell<dyn IdentityManager>>;

/// Builds one identity manager per collection
pub type IdentityManagerFactory = Rc<dyn Fn() -> SharedIdentityManager>;

pub(crate) fn duplicate(id: &RecordId) -> ModelError {
    ModelError::DuplicateId {
        collection: String::new(),
        id: id.to_string(),
    }
}

/// Sequential integer ids: "1", "2", ...
#[derive(Debug, Clone)]
pub struct CounterIdentityManager {
    next_id: u64,
    ids: HashSet<RecordId>,
}

impl Default for CounterIdentityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterIdentityManager {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ids: HashSet::new(),
        }
    }

    /// Wrap a new counter for sharing between schemas
    pub fn shared() -> SharedIdentityManager {
        Rc::new(RefCell::new(Self::new()))
    }

    /// The id the next `fetch` would try first
    pub fn peek(&self) -> u64 {
        self.next_id
    }
}

impl IdentityManager for CounterIdentityManager {
    fn fetch(&mut self, _attrs: &Attrs) -> ModelResult<RecordId> {
        let mut candidate = RecordId::from(self.next_id);
        while self.ids.contains(&candidate) {
            self.next_id = self
                .next_id
                .checked_add(1)
                .ok_or_else(|| ModelError::Configuration("sequential ids are exhausted".to_string()))?;
            candidate = RecordId::from(self.next_id);
        }
        self.ids.insert(candidate.clone());
        self.next_id = self.next_id.saturating_add(1);
        Ok(candidate)
    }

    fn set(&mut self, id: &RecordId) -> ModelResult<()> {
        if self.ids.contains(id) {
            return Err(duplicate(id));
        }
        // u64::MAX has no successor, so it never moves the counter
        if let Some(next) = id.as_u64().and_then(|n| n.checked_add(1)) {
            if next > self.next_id {
                self.next_id = next;
            }
        }
        self.ids.insert(id.clone());
        Ok(())
    }

    fn reset(&mut self) {
        self.next_id = 1;
        self.ids.clear();
    }
}

/// Random v4 UUID ids
#[derive(Debug, Clone, Default)]
pub struct UuidIdentityManager {
    ids: HashSet<RecordId>,
}

impl UuidIdentityManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityManager for UuidIdentityManager {
    fn fetch(&mut self, _attrs: &Attrs) -> ModelResult<RecordId> {
        loop {
            let id = RecordId::new(Uuid::new_v4().to_string());
            if self.ids.insert(id.clone()) {
                return Ok(id);
            }
        }
    }

    fn set(&mut self, id: &RecordId) -> ModelResult<()> {
        if !self.ids.insert(id.clone()) {
            return Err(duplicate(id));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.clear();
    }
}
