//! The seam to the underlying object store.
//!
//! The core never talks to an ORM: the persistence layer flattens its typed
//! objects into [`ObjectRecord`]s and exposes save/delete primitives through
//! [`ObjectStore`]. Recording is explicit - nothing is intercepted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::identity::{ObjectId, TypeName};
use crate::value::FieldValue;

/// A typed object flattened to its tracked fields.
///
/// The currency between the persistence layer, the reconstructor, and the
/// undo engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub type_name: TypeName,
    pub values: BTreeMap<String, FieldValue>,
}

impl ObjectRecord {
    pub fn new(id: ObjectId, type_name: TypeName) -> Self {
        Self {
            id,
            type_name,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(field.into(), value.into());
    }

    /// Value of `field`; missing fields read as `Null`.
    pub fn value(&self, field: &str) -> FieldValue {
        self.values.get(field).cloned().unwrap_or(FieldValue::Null)
    }
}

/// Save/delete primitives of the underlying object store.
///
/// The engine applies exactly one store effect per recorded action.
pub trait ObjectStore {
    fn save(&mut self, record: &ObjectRecord) -> Result<(), Error>;
    fn delete(&mut self, id: &ObjectId) -> Result<(), Error>;
    fn load(&self, id: &ObjectId) -> Option<ObjectRecord>;
}

/// In-memory object store, for tests and reference.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<ObjectId, ObjectRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.rows.contains_key(id)
    }
}

impl ObjectStore for MemoryStore {
    fn save(&mut self, record: &ObjectRecord) -> Result<(), Error> {
        self.rows.insert(record.id, record.clone());
        Ok(())
    }

    fn delete(&mut self, id: &ObjectId) -> Result<(), Error> {
        match self.rows.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::Store {
                op: "delete",
                id: *id,
                detail: "row not found".into(),
            }),
        }
    }

    fn load(&self, id: &ObjectId) -> Option<ObjectRecord> {
        self.rows.get(id).cloned()
    }
}
