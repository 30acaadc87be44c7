//! Undo feasibility.
//!
//! An action is revertible only when reversing it is provably safe under the
//! present state and schema. The verdict carries typed, human-readable
//! reasons so batch callers can report every blocked action.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, Seq};
use crate::error::{Error, Result};
use crate::identity::{ObjectId, TypeName};
use crate::ledger::Ledger;
use crate::schema::SchemaRegistry;

/// Why an action cannot be undone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum UndoBlock {
    /// `reverted_by` is 1:1; an action cannot be reverted twice.
    AlreadyReverted { by: Seq },
    /// The type's field layout differs between the action's time and now.
    /// Drift permanently freezes revertibility.
    SchemaDrift { type_name: TypeName },
    /// A relation held immediately before the action points at an object
    /// that no longer exists.
    MissingReference { field: String, referenced: ObjectId },
    /// Undoing this delete would recreate an object that exists again.
    Recreated { id: ObjectId },
    /// Undoing this create would delete an object that no longer exists.
    Missing { id: ObjectId },
    /// Undoing this create would cascade into a live referrer; undo never
    /// auto-cascades.
    ReferencedBy { referrer: ObjectId },
    /// The pre-action values are already the present values.
    NoEffect,
}

impl fmt::Display for UndoBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoBlock::AlreadyReverted { by } => {
                write!(f, "already reverted by action {by}")
            }
            UndoBlock::SchemaDrift { type_name } => {
                write!(f, "the schema for {type_name} has changed since this action")
            }
            UndoBlock::MissingReference { field, referenced } => {
                write!(
                    f,
                    "field `{field}` used to link to {referenced}, which has since been deleted"
                )
            }
            UndoBlock::Recreated { id } => {
                write!(f, "the object {id} this would recreate already exists")
            }
            UndoBlock::Missing { id } => {
                write!(f, "the object {id} this would delete no longer exists")
            }
            UndoBlock::ReferencedBy { referrer } => {
                write!(f, "a live object {referrer} still references this one")
            }
            UndoBlock::NoEffect => f.write_str("the pre-action values are already current"),
        }
    }
}

/// Feasibility verdict.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revertibility {
    blocks: Vec<UndoBlock>,
}

impl Revertibility {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn blocked(blocks: Vec<UndoBlock>) -> Self {
        Self { blocks }
    }

    pub fn is_revertible(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[UndoBlock] {
        &self.blocks
    }

    /// Human-readable reasons, one per block.
    pub fn reasons(&self) -> Vec<String> {
        self.blocks.iter().map(ToString::to_string).collect()
    }
}

/// Computes whether undoing the action at `seq` is provably safe.
pub fn revertibility(
    ledger: &Ledger,
    registry: &SchemaRegistry,
    seq: Seq,
) -> Result<Revertibility> {
    let action = ledger.action(seq).ok_or(Error::UnknownAction(seq))?;

    if let Some(by) = action.reverted_by {
        return Ok(Revertibility::blocked(vec![UndoBlock::AlreadyReverted {
            by,
        }]));
    }

    let view = ledger.machine_at(registry, action.subject, seq)?;
    let present = view.presently()?;

    // Schema drift is measured against the latest snapshot, not the newest
    // action's time: a registration after the last write still freezes undo.
    if view.type_schema() != registry.latest_schema(view.type_name()) {
        return Ok(Revertibility::blocked(vec![UndoBlock::SchemaDrift {
            type_name: view.type_name().clone(),
        }]));
    }

    let mut blocks = Vec::new();
    match action.kind {
        ActionKind::Delete | ActionKind::Modify => {
            if action.kind == ActionKind::Delete && present.exists() {
                blocks.push(UndoBlock::Recreated { id: action.subject });
            }
            // Relations held immediately before the action must still
            // resolve to live objects.
            let before = view.at_previous()?;
            for field in before.foreign_keys() {
                let Some(target) = before.get(field).and_then(|v| v.as_ref_id()) else {
                    continue;
                };
                let target_live = match ledger.machine(registry, target) {
                    Ok(target_view) => target_view.exists(),
                    Err(Error::UnknownObject(_)) => false,
                    Err(other) => return Err(other),
                };
                if !target_live {
                    blocks.push(UndoBlock::MissingReference {
                        field: field.clone(),
                        referenced: target,
                    });
                }
            }
        }
        ActionKind::Create => {
            if !present.exists() {
                blocks.push(UndoBlock::Missing { id: action.subject });
            } else {
                for referrer in ledger.live_referrers(registry, action.subject)? {
                    blocks.push(UndoBlock::ReferencedBy { referrer });
                }
            }
        }
    }

    Ok(Revertibility::blocked(blocks))
}
