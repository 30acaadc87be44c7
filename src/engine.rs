//! Engine: store effects tied to ledger records.
//!
//! The engine owns the action log, the schema registry, the monotonic clock,
//! and the object store. Every successful store effect is recorded exactly
//! once, synchronously, before the caller treats it as committed; undo flows
//! through the same write path and cross-links the two actions.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::action::{Action, ActionKind, Seq};
use crate::clock::{Clock, Moment};
use crate::error::{Error, Result};
use crate::identity::{ActorId, ObjectId};
use crate::ledger::{Ledger, SaveOutcome};
use crate::machine::TimeMachine;
use crate::schema::{SchemaRegistry, TypeManifest};
use crate::store::{ObjectRecord, ObjectStore};
use crate::undo::{self, Revertibility, UndoBlock};

/// Outcome of an undo request. Blocked outcomes are values, not errors, so
/// batch callers can collect them and continue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The reverting action.
    Undone { action: Seq },
    Blocked { revertibility: Revertibility },
}

impl UndoOutcome {
    pub fn is_undone(&self) -> bool {
        matches!(self, UndoOutcome::Undone { .. })
    }

    pub fn action(&self) -> Option<Seq> {
        match self {
            UndoOutcome::Undone { action } => Some(*action),
            UndoOutcome::Blocked { .. } => None,
        }
    }
}

/// Per-action result of a batch undo. Batched undos are independent atomic
/// appends; partial success across a batch is expected.
#[derive(Debug)]
pub struct UndoReport {
    pub seq: Seq,
    pub outcome: Result<UndoOutcome>,
}

/// Serializable audit state: the log and the snapshots, everything needed to
/// rebuild every view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditState {
    pub ledger: Ledger,
    pub registry: SchemaRegistry,
}

pub struct Engine<S> {
    store: S,
    ledger: Ledger,
    registry: SchemaRegistry,
    clock: Clock,
}

impl<S: ObjectStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: Ledger::new(),
            registry: SchemaRegistry::new(),
            clock: Clock::new(),
        }
    }

    /// Rebuilds an engine from an exported audit state and a store holding
    /// the matching rows.
    pub fn import_json(store: S, json: &str) -> Result<Self> {
        let state: AuditState = serde_json::from_str(json)?;
        let floor = state
            .ledger
            .actions()
            .last()
            .map(|action| action.at)
            .into_iter()
            .chain(state.registry.snapshots().iter().map(|s| s.valid_from))
            .max()
            .unwrap_or(Moment::ZERO);
        Ok(Self {
            store,
            ledger: state.ledger,
            registry: state.registry,
            clock: Clock::resume(floor),
        })
    }

    pub fn export_json(&self) -> Result<String> {
        let state = AuditState {
            ledger: self.ledger.clone(),
            registry: self.registry.clone(),
        };
        Ok(serde_json::to_string_pretty(&state)?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Registers the current layout of every tracked type. Returns whether a
    /// new snapshot was recorded.
    pub fn register_schema(&mut self, manifests: &[TypeManifest]) -> bool {
        let now = self.clock.tick();
        self.registry.register(manifests, now).is_some()
    }

    /// Audit listing, newest first.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.ledger.actions_desc()
    }

    pub fn machine(&self, id: ObjectId) -> Result<TimeMachine<'_>> {
        self.ledger.machine(&self.registry, id)
    }

    pub fn machine_at(&self, id: ObjectId, step: Seq) -> Result<TimeMachine<'_>> {
        self.ledger.machine_at(&self.registry, id, step)
    }

    pub fn machine_at_time(&self, id: ObjectId, when: Moment) -> Result<TimeMachine<'_>> {
        self.ledger.machine_at_time(&self.registry, id, when)
    }

    /// Saves through the store, then records the action.
    ///
    /// Every rejection happens before the store effect; `record_save` must
    /// not fail once the row is written.
    pub fn save(&mut self, actor: &ActorId, candidate: &ObjectRecord) -> Result<SaveOutcome> {
        if self.registry.latest_schema(&candidate.type_name).is_none() {
            return Err(Error::UnregisteredType(candidate.type_name.clone()));
        }
        if let Some(expected) = self.ledger.type_of(candidate.id) {
            if *expected != candidate.type_name {
                return Err(Error::TypeMismatch {
                    id: candidate.id,
                    expected: expected.clone(),
                    found: candidate.type_name.clone(),
                });
            }
        }
        self.store.save(candidate)?;
        let now = self.clock.tick();
        self.ledger
            .record_save(&self.registry, actor, candidate, now)
    }

    /// Deletes `id` and every live object holding a relation back to it,
    /// dependents first. Each cascade member's store deletion is applied
    /// before its tombstone is recorded, so an error mid-cascade never
    /// leaves a recorded action without its store effect. Returns the
    /// recorded Delete actions in log order; the last one is the target's
    /// own.
    pub fn delete(&mut self, actor: &ActorId, id: ObjectId) -> Result<Vec<Seq>> {
        let order = self.ledger.delete_order(&self.registry, id)?;
        let mut seqs = Vec::with_capacity(order.len());
        for target in order {
            self.store.delete(&target)?;
            let now = self.clock.tick();
            seqs.push(self.ledger.record_tombstone(actor, target, now)?);
        }
        info!(id = %id, cascade = seqs.len(), "delete cascade recorded");
        Ok(seqs)
    }

    pub fn is_revertible(&self, seq: Seq) -> Result<Revertibility> {
        undo::revertibility(&self.ledger, &self.registry, seq)
    }

    /// Undoes the action at `seq` when provably safe.
    ///
    /// The inverse operation flows through the same save/delete path; the
    /// original action gets `reverted_by` and the new one gets `reverts`.
    pub fn undo(&mut self, actor: &ActorId, seq: Seq) -> Result<UndoOutcome> {
        let verdict = self.is_revertible(seq)?;
        if !verdict.is_revertible() {
            warn!(%seq, blocks = verdict.blocks().len(), "undo blocked");
            return Ok(UndoOutcome::Blocked {
                revertibility: verdict,
            });
        }

        let action = self
            .ledger
            .action(seq)
            .ok_or(Error::UnknownAction(seq))?
            .clone();

        let reverting = match action.kind {
            ActionKind::Delete | ActionKind::Modify => {
                // Restore the object as it was immediately before the action.
                let record = self
                    .ledger
                    .machine_at(&self.registry, action.subject, seq.previous())?
                    .restore()?;
                match self.save(actor, &record)? {
                    SaveOutcome::Recorded(new_seq) => new_seq,
                    SaveOutcome::NoOp => {
                        return Ok(UndoOutcome::Blocked {
                            revertibility: Revertibility::blocked(vec![UndoBlock::NoEffect]),
                        });
                    }
                }
            }
            ActionKind::Create => {
                let seqs = self.delete(actor, action.subject)?;
                *seqs.last().expect("cascade records at least the target")
            }
        };

        self.ledger.link_revert(seq, reverting)?;
        info!(undone = %seq, by = %reverting, "action reverted");
        Ok(UndoOutcome::Undone { action: reverting })
    }

    /// Undoes many actions as independent appends, reporting per-action
    /// outcomes and continuing past blocked or failed entries.
    pub fn undo_batch(&mut self, actor: &ActorId, seqs: &[Seq]) -> Vec<UndoReport> {
        seqs.iter()
            .map(|seq| UndoReport {
                seq: *seq,
                outcome: self.undo(actor, *seq),
            })
            .collect()
    }

    /// Plaintext audit description of one action: kind, editor, time, and
    /// the affected field values (`old -> new` for modifications).
    pub fn action_summary(&self, seq: Seq) -> Result<String> {
        let action = self.ledger.action(seq).ok_or(Error::UnknownAction(seq))?;
        let view = self.machine_at(action.subject, seq)?;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} {} by {} at {}",
            action.kind,
            view.type_name(),
            action.subject,
            action.editor,
            action.at
        );

        match action.kind {
            ActionKind::Create | ActionKind::Delete => {
                for field in view.all_fields() {
                    let value = view.get(field).cloned().unwrap_or_default();
                    let _ = writeln!(out, "  {field}: {value}");
                }
            }
            ActionKind::Modify => {
                let before = view.at_previous()?;
                for commit in self.ledger.commits_for_action(seq) {
                    let old = before.get(&commit.key).cloned().unwrap_or_default();
                    let _ = writeln!(out, "  {}: {} -> {}", commit.key, old, commit.value);
                }
            }
        }

        Ok(out)
    }
}
