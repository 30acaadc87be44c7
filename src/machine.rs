//! Point-in-time reconstruction.

use crate::action::{Action, Seq};
use crate::clock::Moment;
use crate::error::{DanglingReference, Error, IntegrityError, Result};
use crate::identity::{ObjectId, TypeName};
use crate::ledger::{Ledger, ObjectHistory};
use crate::schema::{SchemaRegistry, TypeSchema};
use crate::store::ObjectRecord;
use crate::value::FieldValue;

/// A view of one object pinned to a step of the action log.
///
/// Answers existence and field-value queries as of that step. The object's
/// immutable bookkeeping (type, creation/deletion steps, commit lists) lives
/// in the ledger and is shared by reference, so re-pinning with [`at`] is
/// cheap.
///
/// [`at`]: TimeMachine::at
#[derive(Clone)]
pub struct TimeMachine<'a> {
    ledger: &'a Ledger,
    registry: &'a SchemaRegistry,
    history: &'a ObjectHistory,
    id: ObjectId,
    step: Seq,
    when: Moment,
    schema: Option<&'a TypeSchema>,
}

impl<'a> TimeMachine<'a> {
    pub(crate) fn pinned(
        ledger: &'a Ledger,
        registry: &'a SchemaRegistry,
        id: ObjectId,
        step: Seq,
    ) -> Result<Self> {
        let history = ledger.history(id).ok_or(Error::UnknownObject(id))?;
        let when = match ledger.action(step) {
            Some(action) => action.at,
            None if step == Seq::ZERO => Moment::ZERO,
            None => return Err(Error::UnknownAction(step)),
        };

        let schema = registry.schema_as_of(&history.type_name, when);
        if schema.is_none() {
            // Tolerable only while the object does not yet exist; otherwise
            // the registry was not run before the object was created.
            if let Some(first) = history.creations.first() {
                if *first <= step {
                    return Err(IntegrityError {
                        type_name: history.type_name.clone(),
                        id,
                        created: *first,
                    }
                    .into());
                }
            }
        }

        Ok(Self {
            ledger,
            registry,
            history,
            id,
            step,
            when,
            schema,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn step(&self) -> Seq {
        self.step
    }

    pub fn when(&self) -> Moment {
        self.when
    }

    pub fn type_name(&self) -> &'a TypeName {
        &self.history.type_name
    }

    /// The action this view is pinned to; `None` at step zero.
    pub fn action(&self) -> Option<&'a Action> {
        self.ledger.action(self.step)
    }

    /// The same object re-pinned to a different step.
    pub fn at(&self, step: Seq) -> Result<TimeMachine<'a>> {
        Self::pinned(self.ledger, self.registry, self.id, step)
    }

    /// The view immediately before this one's action.
    pub fn at_previous(&self) -> Result<TimeMachine<'a>> {
        self.at(self.step.previous())
    }

    /// The view at the newest action in the log.
    pub fn presently(&self) -> Result<TimeMachine<'a>> {
        let head = self.ledger.head().ok_or(Error::EmptyLog)?;
        self.at(head)
    }

    pub fn exists(&self) -> bool {
        self.history.exists_at(self.step)
    }

    /// Latest committed value of `field` at this step.
    ///
    /// `None` means the field has no commit yet, e.g. it was introduced by a
    /// later schema evolution.
    pub fn get(&self, field: &str) -> Option<&'a FieldValue> {
        self.history.value_at(field, self.step)
    }

    /// View of the object that `field` relates to, pinned to this view's own
    /// step, so chained dereferences stay time-consistent.
    pub fn related(&self, field: &str) -> Result<Option<TimeMachine<'a>>> {
        let is_fk = self
            .schema
            .is_some_and(|schema| schema.is_foreign_key(field));
        if !is_fk {
            return Err(Error::FieldNotRelation {
                type_name: self.history.type_name.clone(),
                field: field.to_string(),
            });
        }
        let target = match self.get(field) {
            None | Some(FieldValue::Null) => return Ok(None),
            Some(value) => match value.as_ref_id() {
                Some(id) => id,
                None => {
                    return Err(Error::FieldNotRelation {
                        type_name: self.history.type_name.clone(),
                        field: field.to_string(),
                    })
                }
            },
        };
        match Self::pinned(self.ledger, self.registry, target, self.step) {
            Ok(view) => Ok(Some(view)),
            Err(Error::UnknownObject(_)) => Err(DanglingReference {
                id: self.id,
                field: field.to_string(),
                referenced: target,
            }
            .into()),
            Err(other) => Err(other),
        }
    }

    /// Scalar field names valid at this view's time.
    pub fn fields(&self) -> impl Iterator<Item = &'a String> {
        self.schema.map(|s| s.fields.iter()).into_iter().flatten()
    }

    /// Relation field names valid at this view's time.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &'a String> {
        self.schema
            .map(|s| s.foreign_keys.iter())
            .into_iter()
            .flatten()
    }

    /// Every schema-declared field name valid at this view's time.
    pub fn all_fields(&self) -> impl Iterator<Item = &'a String> {
        self.schema.map(|s| s.all_fields()).into_iter().flatten()
    }

    pub(crate) fn type_schema(&self) -> Option<&'a TypeSchema> {
        self.schema
    }

    /// Writes every schema-declared field's reconstructed value onto a fresh
    /// record carrying this object's identity, ready for persistence.
    pub fn restore(&self) -> Result<ObjectRecord> {
        let schema = self
            .schema
            .ok_or_else(|| Error::UnregisteredType(self.history.type_name.clone()))?;
        let mut record = ObjectRecord::new(self.id, self.history.type_name.clone());
        for field in schema.all_fields() {
            let value = self.get(field).cloned().unwrap_or(FieldValue::Null);
            record.set(field.clone(), value);
        }
        Ok(record)
    }
}
