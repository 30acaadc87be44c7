//! Object-level temporal versioning, audit, and undo over a mutable object
//! store.
//!
//! Every tracked object carries a full history of create/modify/delete
//! actions. The [`machine::TimeMachine`] reconstructs an object's field
//! values as of any past step, and the [`engine::Engine`] reverses a past
//! action when that is provably safe under referential-integrity and
//! schema-compatibility contracts.
//!
//! Module hierarchy follows type dependency order:
//! - clock: wall-clock instants and the monotonic append clock
//! - identity: ObjectId, ActorId, TypeName
//! - value: tagged field values
//! - schema: manifests, immutable snapshots, registry
//! - action: Action and commit records
//! - ledger: the append-only action log and write path
//! - machine: point-in-time reconstruction
//! - undo: revertibility
//! - store: the object-store seam
//! - engine: store effects tied to ledger records

#![forbid(unsafe_code)]

pub mod action;
pub mod clock;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod machine;
pub mod schema;
pub mod store;
pub mod undo;
pub mod value;

pub use error::{DanglingReference, Error, IntegrityError, InvalidId};
pub type Result<T> = std::result::Result<T, Error>;

pub use action::{Action, ActionKind, CreationCommit, DeletionCommit, ModificationCommit, Seq};
pub use clock::{Clock, Moment};
pub use engine::{AuditState, Engine, UndoOutcome, UndoReport};
pub use identity::{ActorId, ObjectId, TypeName};
pub use ledger::{Ledger, SaveOutcome};
pub use machine::TimeMachine;
pub use schema::{
    Describable, FieldKind, FieldSpec, SchemaRegistry, SchemaSnapshot, TypeManifest, TypeSchema,
};
pub use store::{MemoryStore, ObjectRecord, ObjectStore};
pub use undo::{Revertibility, UndoBlock};
pub use value::FieldValue;
