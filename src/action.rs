//! Actions and their commits: the write-once audit records.
//!
//! An action is one logged top-level operation; its commits record what
//! changed. All of them are immutable once appended, except that
//! `reverted_by` is set when a later action undoes this one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Moment;
use crate::identity::{ActorId, ObjectId, TypeName};
use crate::value::FieldValue;

/// Log position of an action; the log's logical clock.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Seq(u64);

impl Seq {
    /// Sentinel for "before any action".
    pub const ZERO: Seq = Seq(0);

    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn previous(&self) -> Seq {
        Seq(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Modify,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Modify => "modify",
            ActionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged top-level create/modify/delete operation.
///
/// `reverted_by` is 1:1 - an action is reverted by at most one other action
/// and cannot be reverted twice. `reverts` is the back-link set at creation
/// on an action produced by an undo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub seq: Seq,
    pub editor: ActorId,
    pub at: Moment,
    pub subject: ObjectId,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverted_by: Option<Seq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverts: Option<Seq>,
}

impl Action {
    pub fn is_reverted(&self) -> bool {
        self.reverted_by.is_some()
    }
}

/// Binds an identity to its type; one per create action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationCommit {
    pub subject: ObjectId,
    pub action: Seq,
    pub type_name: TypeName,
}

/// One field's encoded value under one action.
///
/// For relation fields the value is `FieldValue::Ref`; scalars carry the
/// tagged value itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModificationCommit {
    pub subject: ObjectId,
    pub action: Seq,
    pub key: String,
    pub value: FieldValue,
}

/// Tombstone. A delete action carries no field commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionCommit {
    pub subject: ObjectId,
    pub action: Seq,
}
