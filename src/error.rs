//! Error taxonomy.
//!
//! Fatal conditions are `Err`. Recoverable outcomes - a save with no field
//! changes, an undo whose preconditions failed - are values
//! ([`crate::ledger::SaveOutcome`], [`crate::engine::UndoOutcome`]) so that
//! batch callers can collect partial failures and keep going.

use thiserror::Error;

use crate::action::Seq;
use crate::identity::{ObjectId, TypeName};

/// Invalid identity input.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("object id `{raw}` is invalid: {reason}")]
    Object { raw: String, reason: String },
    #[error("actor id `{raw}` is invalid: {reason}")]
    Actor { raw: String, reason: String },
    #[error("type name `{raw}` is invalid: {reason}")]
    Type { raw: String, reason: String },
}

/// The schema registry was not run before the object existed.
///
/// Fatal and non-retriable: history before the first snapshot cannot be
/// interpreted.
#[derive(Debug, Error, Clone)]
#[error(
    "{type_name} {id} predates the registered schema for its type \
     (first created at step {created})"
)]
pub struct IntegrityError {
    pub type_name: TypeName,
    pub id: ObjectId,
    pub created: Seq,
}

/// Reconstruction hit a relation whose target has no recorded history.
///
/// Always surfaced, never silently defaulted.
#[derive(Debug, Error, Clone)]
#[error("field `{field}` of {id} references {referenced}, which has no recorded history")]
pub struct DanglingReference {
    pub id: ObjectId,
    pub field: String,
    pub referenced: ObjectId,
}

/// Canonical error enum.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    DanglingReference(#[from] DanglingReference),
    #[error("object {0} has no recorded history")]
    UnknownObject(ObjectId),
    #[error("object {0} does not presently exist")]
    NotPresent(ObjectId),
    #[error("no action at step {0}")]
    UnknownAction(Seq),
    #[error("the action log is empty")]
    EmptyLog,
    #[error("field `{field}` of {type_name} is not a relation")]
    FieldNotRelation { type_name: TypeName, field: String },
    #[error("type `{0}` is not present in the latest schema snapshot")]
    UnregisteredType(TypeName),
    #[error("identity {id} was created as {expected}, got a {found}")]
    TypeMismatch {
        id: ObjectId,
        expected: TypeName,
        found: TypeName,
    },
    #[error("store {op} failed for {id}: {detail}")]
    Store {
        op: &'static str,
        id: ObjectId,
        detail: String,
    },
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
