//! The append-only action log and its write path.
//!
//! INVARIANT: `actions[i].seq == i + 1`. Reconstruction is defined purely as
//! "commits with seq <= N", so every view is replayable from the log alone
//! and safe for any number of concurrent readers. Appends require
//! `&mut self`: the read-reconstruct -> diff -> append sequence cannot be
//! interleaved within one log.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::{
    Action, ActionKind, CreationCommit, DeletionCommit, ModificationCommit, Seq,
};
use crate::clock::Moment;
use crate::error::{Error, Result};
use crate::identity::{ActorId, ObjectId, TypeName};
use crate::machine::TimeMachine;
use crate::schema::SchemaRegistry;
use crate::store::ObjectRecord;
use crate::value::FieldValue;

/// Outcome of a save: a recorded action, or nothing when the diff was empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Recorded(Seq),
    NoOp,
}

impl SaveOutcome {
    pub fn seq(&self) -> Option<Seq> {
        match self {
            SaveOutcome::Recorded(seq) => Some(*seq),
            SaveOutcome::NoOp => None,
        }
    }
}

/// Per-object bookkeeping shared by every view of that object.
///
/// `creations`, `deletions`, and each commit list are in append order, which
/// is seq order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ObjectHistory {
    pub(crate) type_name: TypeName,
    pub(crate) creations: Vec<Seq>,
    pub(crate) deletions: Vec<Seq>,
    pub(crate) commits: BTreeMap<String, Vec<(Seq, FieldValue)>>,
}

impl ObjectHistory {
    fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            creations: Vec::new(),
            deletions: Vec::new(),
            commits: BTreeMap::new(),
        }
    }

    /// Alive at `step` iff the latest creation at or before `step` is not
    /// shadowed by a later deletion. Handles create -> delete -> recreate.
    pub(crate) fn exists_at(&self, step: Seq) -> bool {
        let Some(created) = self.creations.iter().rev().find(|s| **s <= step) else {
            return false;
        };
        match self.deletions.iter().rev().find(|s| **s <= step) {
            Some(deleted) if deleted > created => false,
            _ => true,
        }
    }

    /// Latest committed value of `field` at or before `step`.
    pub(crate) fn value_at(&self, field: &str, step: Seq) -> Option<&FieldValue> {
        let commits = self.commits.get(field)?;
        let idx = commits.partition_point(|(seq, _)| *seq <= step);
        if idx == 0 {
            None
        } else {
            Some(&commits[idx - 1].1)
        }
    }
}

/// The action log plus its commit indexes: the single ordering authority.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    actions: Vec<Action>,
    objects: BTreeMap<ObjectId, ObjectHistory>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Newest action's seq.
    pub fn head(&self) -> Option<Seq> {
        self.actions.last().map(|action| action.seq)
    }

    pub fn action(&self, seq: Seq) -> Option<&Action> {
        let idx = seq.get().checked_sub(1)?;
        self.actions.get(idx as usize)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Audit order: newest first.
    pub fn actions_desc(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().rev()
    }

    pub(crate) fn history(&self, id: ObjectId) -> Option<&ObjectHistory> {
        self.objects.get(&id)
    }

    pub fn type_of(&self, id: ObjectId) -> Option<&TypeName> {
        self.objects.get(&id).map(|history| &history.type_name)
    }

    /// Translates a wall-clock time to the latest action seq at or before it.
    pub fn seq_at_time(&self, when: Moment) -> Option<Seq> {
        let idx = self.actions.partition_point(|action| action.at <= when);
        idx.checked_sub(1).map(|i| self.actions[i].seq)
    }

    // -------------------------------------------------------------------
    // Reconstruction entry points
    // -------------------------------------------------------------------

    /// View of `id` at the newest action.
    pub fn machine<'a>(
        &'a self,
        registry: &'a SchemaRegistry,
        id: ObjectId,
    ) -> Result<TimeMachine<'a>> {
        let head = self.head().ok_or(Error::EmptyLog)?;
        self.machine_at(registry, id, head)
    }

    /// View of `id` pinned to `step`.
    pub fn machine_at<'a>(
        &'a self,
        registry: &'a SchemaRegistry,
        id: ObjectId,
        step: Seq,
    ) -> Result<TimeMachine<'a>> {
        TimeMachine::pinned(self, registry, id, step)
    }

    /// View of `id` as of a wall-clock time. A `when` earlier than the first
    /// action pins to [`Seq::ZERO`], before anything existed.
    pub fn machine_at_time<'a>(
        &'a self,
        registry: &'a SchemaRegistry,
        id: ObjectId,
        when: Moment,
    ) -> Result<TimeMachine<'a>> {
        if self.is_empty() {
            return Err(Error::EmptyLog);
        }
        let step = self.seq_at_time(when).unwrap_or(Seq::ZERO);
        self.machine_at(registry, id, step)
    }

    // -------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------

    /// Records a save of `candidate`.
    ///
    /// An object that does not presently exist gets a Create action whose
    /// commits cover the full current value of every schema-declared field.
    /// An existing object is diffed against its present view: an empty diff
    /// records nothing, a non-empty one gets a Modify action whose commits
    /// cover only the changed fields.
    pub fn record_save(
        &mut self,
        registry: &SchemaRegistry,
        actor: &ActorId,
        candidate: &ObjectRecord,
        now: Moment,
    ) -> Result<SaveOutcome> {
        let schema = registry
            .latest_schema(&candidate.type_name)
            .ok_or_else(|| Error::UnregisteredType(candidate.type_name.clone()))?;

        let existed = match self.objects.get(&candidate.id) {
            Some(history) if history.type_name != candidate.type_name => {
                return Err(Error::TypeMismatch {
                    id: candidate.id,
                    expected: history.type_name.clone(),
                    found: candidate.type_name.clone(),
                });
            }
            Some(history) => !history.creations.is_empty(),
            None => false,
        };

        let mut exists_now = false;
        let mut mods: Vec<(String, FieldValue)> = Vec::new();
        if existed {
            let view = self.machine(registry, candidate.id)?;
            exists_now = view.exists();
            if exists_now {
                for field in schema.all_fields() {
                    let current = view.get(field).cloned().unwrap_or(FieldValue::Null);
                    let incoming = candidate.value(field);
                    if current != incoming {
                        mods.push((field.clone(), incoming));
                    }
                }
                if mods.is_empty() {
                    debug!(id = %candidate.id, "save with no field changes, nothing recorded");
                    return Ok(SaveOutcome::NoOp);
                }
            }
        }

        let seq = if exists_now {
            let seq = self.append(actor, candidate.id, ActionKind::Modify, now);
            let history = self
                .objects
                .get_mut(&candidate.id)
                .expect("existing object checked above");
            for (key, value) in mods {
                history.commits.entry(key).or_default().push((seq, value));
            }
            info!(id = %candidate.id, %seq, "modification recorded");
            seq
        } else {
            // (Re)creation commits the full current value of every declared
            // field: diffing against "nothing" is undefined.
            let seq = self.append(actor, candidate.id, ActionKind::Create, now);
            let history = self
                .objects
                .entry(candidate.id)
                .or_insert_with(|| ObjectHistory::new(candidate.type_name.clone()));
            history.creations.push(seq);
            for field in schema.all_fields() {
                history
                    .commits
                    .entry(field.clone())
                    .or_default()
                    .push((seq, candidate.value(field)));
            }
            info!(id = %candidate.id, type_name = %candidate.type_name, %seq, "creation recorded");
            seq
        };

        Ok(SaveOutcome::Recorded(seq))
    }

    /// Validates that `id` presently exists and computes its delete cascade:
    /// every live object holding a relation back to it, depth-first
    /// post-order, the target itself last. Dependents recorded in this order
    /// get strictly earlier Delete actions.
    pub fn delete_order(
        &self,
        registry: &SchemaRegistry,
        id: ObjectId,
    ) -> Result<Vec<ObjectId>> {
        let history = self.objects.get(&id).ok_or(Error::UnknownObject(id))?;
        let head = self.head().ok_or(Error::EmptyLog)?;
        if !history.exists_at(head) {
            return Err(Error::NotPresent(id));
        }
        self.cascade_order(registry, id)
    }

    /// Records one Delete tombstone for `target`.
    pub fn record_tombstone(
        &mut self,
        actor: &ActorId,
        target: ObjectId,
        now: Moment,
    ) -> Result<Seq> {
        if !self.objects.contains_key(&target) {
            return Err(Error::UnknownObject(target));
        }
        let seq = self.append(actor, target, ActionKind::Delete, now);
        self.objects
            .get_mut(&target)
            .expect("presence checked above")
            .deletions
            .push(seq);
        debug!(id = %target, %seq, "deletion recorded");
        Ok(seq)
    }

    /// Depth-first post-order over live referrers; the target comes last.
    pub fn cascade_order(
        &self,
        registry: &SchemaRegistry,
        id: ObjectId,
    ) -> Result<Vec<ObjectId>> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        self.collect_cascade(registry, id, &mut visited, &mut order)?;
        Ok(order)
    }

    fn collect_cascade(
        &self,
        registry: &SchemaRegistry,
        id: ObjectId,
        visited: &mut BTreeSet<ObjectId>,
        order: &mut Vec<ObjectId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        for referrer in self.live_referrers(registry, id)? {
            self.collect_cascade(registry, referrer, visited, order)?;
        }
        order.push(id);
        Ok(())
    }

    /// Live objects whose present view holds a `Ref` back to `id`.
    pub fn live_referrers(
        &self,
        registry: &SchemaRegistry,
        id: ObjectId,
    ) -> Result<Vec<ObjectId>> {
        let Some(head) = self.head() else {
            return Ok(Vec::new());
        };
        let mut referrers = Vec::new();
        for (candidate, history) in &self.objects {
            if *candidate == id || !history.exists_at(head) {
                continue;
            }
            let Some(schema) = registry.latest_schema(&history.type_name) else {
                continue;
            };
            let holds_ref = schema.foreign_keys.iter().any(|fk| {
                history
                    .value_at(fk, head)
                    .and_then(FieldValue::as_ref_id)
                    .is_some_and(|target| target == id)
            });
            if holds_ref {
                referrers.push(*candidate);
            }
        }
        Ok(referrers)
    }

    /// Cross-links an undone action with the action that reverted it.
    pub(crate) fn link_revert(&mut self, undone: Seq, reverting: Seq) -> Result<()> {
        let undone_idx = self.index_of(undone)?;
        let reverting_idx = self.index_of(reverting)?;
        debug_assert!(self.actions[undone_idx].reverted_by.is_none());
        self.actions[undone_idx].reverted_by = Some(reverting);
        self.actions[reverting_idx].reverts = Some(undone);
        Ok(())
    }

    fn index_of(&self, seq: Seq) -> Result<usize> {
        let idx = seq.get().checked_sub(1).ok_or(Error::UnknownAction(seq))? as usize;
        if idx < self.actions.len() {
            Ok(idx)
        } else {
            Err(Error::UnknownAction(seq))
        }
    }

    fn append(&mut self, actor: &ActorId, subject: ObjectId, kind: ActionKind, at: Moment) -> Seq {
        let seq = Seq::new(self.actions.len() as u64 + 1);
        debug_assert!(self.actions.last().is_none_or(|last| last.at < at));
        self.actions.push(Action {
            seq,
            editor: actor.clone(),
            at,
            subject,
            kind,
            reverted_by: None,
            reverts: None,
        });
        seq
    }

    // -------------------------------------------------------------------
    // Commit-row views for the audit surface
    // -------------------------------------------------------------------

    pub fn creation_commits(&self) -> Vec<CreationCommit> {
        let mut rows: Vec<CreationCommit> = self
            .objects
            .iter()
            .flat_map(|(id, history)| {
                history.creations.iter().map(|seq| CreationCommit {
                    subject: *id,
                    action: *seq,
                    type_name: history.type_name.clone(),
                })
            })
            .collect();
        rows.sort_by_key(|row| row.action);
        rows
    }

    pub fn deletion_commits(&self) -> Vec<DeletionCommit> {
        let mut rows: Vec<DeletionCommit> = self
            .objects
            .iter()
            .flat_map(|(id, history)| {
                history.deletions.iter().map(|seq| DeletionCommit {
                    subject: *id,
                    action: *seq,
                })
            })
            .collect();
        rows.sort_by_key(|row| row.action);
        rows
    }

    /// Field commits owned by one action.
    pub fn commits_for_action(&self, seq: Seq) -> Vec<ModificationCommit> {
        let Some(action) = self.action(seq) else {
            return Vec::new();
        };
        let Some(history) = self.objects.get(&action.subject) else {
            return Vec::new();
        };
        history
            .commits
            .iter()
            .flat_map(|(key, commits)| {
                commits
                    .iter()
                    .filter(|(s, _)| *s == seq)
                    .map(move |(s, value)| ModificationCommit {
                        subject: action.subject,
                        action: *s,
                        key: key.clone(),
                        value: value.clone(),
                    })
            })
            .collect()
    }
}
