//! Undo: feasibility verdicts, execution, cross-linking, and batches.

mod fixtures;

use fixtures::{actor, concept, connection, engine, language, word};
use retrace::{ActionKind, FieldValue, ObjectStore, Seq, UndoBlock, UndoOutcome};

#[test]
fn undo_modify_restores_the_previous_values() {
    let mut engine = engine();
    let alice = actor("alice");

    let mut eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    eng.set("code", "en");
    let modified = engine.save(&alice, &eng).unwrap().seq().unwrap();
    let len_before = engine.ledger().len();

    let outcome = engine.undo(&alice, modified).unwrap();
    let UndoOutcome::Undone { action: reverting } = outcome else {
        panic!("expected undo to proceed: {outcome:?}");
    };

    // Exactly one new action, cross-linked both ways.
    assert_eq!(engine.ledger().len(), len_before + 1);
    assert_eq!(
        engine.ledger().action(modified).unwrap().reverted_by,
        Some(reverting)
    );
    let reverting_action = engine.ledger().action(reverting).unwrap();
    assert_eq!(reverting_action.reverts, Some(modified));
    assert_eq!(reverting_action.kind, ActionKind::Modify);

    let view = engine.machine(eng.id).unwrap();
    assert_eq!(view.get("code"), Some(&FieldValue::from("eng")));
    assert_eq!(
        engine.store().load(&eng.id).unwrap().value("code"),
        FieldValue::from("eng")
    );
}

#[test]
fn undo_delete_recreates_the_object() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let dog = word("dog", eng.id);
    engine.save(&alice, &dog).unwrap();
    let deleted = *engine.delete(&alice, dog.id).unwrap().last().unwrap();
    assert!(!engine.store().contains(&dog.id));

    let outcome = engine.undo(&alice, deleted).unwrap();
    let UndoOutcome::Undone { action: reverting } = outcome else {
        panic!("expected undo to proceed: {outcome:?}");
    };

    let recreated = engine.ledger().action(reverting).unwrap();
    assert_eq!(recreated.kind, ActionKind::Create);
    assert_eq!(recreated.subject, dog.id);

    // Same identity, same fields.
    let view = engine.machine(dog.id).unwrap();
    assert!(view.exists());
    assert_eq!(view.restore().unwrap(), dog);
    assert!(engine.store().contains(&dog.id));
}

#[test]
fn undo_create_deletes_and_links_the_tombstone() {
    let mut engine = engine();
    let alice = actor("alice");

    let canine = concept("canine");
    let created = engine.save(&alice, &canine).unwrap().seq().unwrap();

    let outcome = engine.undo(&alice, created).unwrap();
    let UndoOutcome::Undone { action: reverting } = outcome else {
        panic!("expected undo to proceed: {outcome:?}");
    };

    let tombstone = engine.ledger().action(reverting).unwrap();
    assert_eq!(tombstone.kind, ActionKind::Delete);
    assert_eq!(tombstone.subject, canine.id);
    assert_eq!(tombstone.reverts, Some(created));
    assert!(!engine.machine(canine.id).unwrap().exists());
    assert!(!engine.store().contains(&canine.id));
}

#[test]
fn undo_create_is_blocked_while_a_referrer_lives() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let dog = word("dog", eng.id);
    engine.save(&alice, &dog).unwrap();
    let canine = concept("canine");
    let created = engine.save(&alice, &canine).unwrap().seq().unwrap();
    let join = connection(dog.id, canine.id);
    engine.save(&alice, &join).unwrap();

    let outcome = engine.undo(&alice, created).unwrap();
    let UndoOutcome::Blocked { revertibility } = outcome else {
        panic!("expected the join row to block the undo");
    };
    assert_eq!(
        revertibility.blocks(),
        &[UndoBlock::ReferencedBy { referrer: join.id }]
    );

    // Once the join row is gone the create becomes revertible.
    engine.delete(&alice, join.id).unwrap();
    assert!(engine.is_revertible(created).unwrap().is_revertible());
    let outcome = engine.undo(&alice, created).unwrap();
    assert!(outcome.is_undone());
    assert!(!engine.machine(canine.id).unwrap().exists());
}

#[test]
fn undo_create_is_blocked_once_the_object_is_gone() {
    let mut engine = engine();
    let alice = actor("alice");

    let canine = concept("canine");
    let created = engine.save(&alice, &canine).unwrap().seq().unwrap();
    engine.delete(&alice, canine.id).unwrap();

    let outcome = engine.undo(&alice, created).unwrap();
    let UndoOutcome::Blocked { revertibility } = outcome else {
        panic!("expected a missing-object block");
    };
    assert_eq!(
        revertibility.blocks(),
        &[UndoBlock::Missing { id: canine.id }]
    );
}

#[test]
fn undo_delete_is_blocked_after_recreation() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let deleted = *engine.delete(&alice, eng.id).unwrap().last().unwrap();
    engine.save(&alice, &eng).unwrap();

    let outcome = engine.undo(&alice, deleted).unwrap();
    let UndoOutcome::Blocked { revertibility } = outcome else {
        panic!("expected the recreated object to block the undo");
    };
    assert_eq!(
        revertibility.blocks(),
        &[UndoBlock::Recreated { id: eng.id }]
    );
}

#[test]
fn undo_modify_is_blocked_when_a_past_reference_is_gone() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let mut dog = word("dog", eng.id);
    engine.save(&alice, &dog).unwrap();
    dog.set("full", "hound");
    let modified = engine.save(&alice, &dog).unwrap().seq().unwrap();

    // Deleting the language cascades into the word and leaves the modify's
    // pre-action language reference dangling in the present.
    engine.delete(&alice, eng.id).unwrap();

    let outcome = engine.undo(&alice, modified).unwrap();
    let UndoOutcome::Blocked { revertibility } = outcome else {
        panic!("expected a missing-reference block");
    };
    assert_eq!(
        revertibility.blocks(),
        &[UndoBlock::MissingReference {
            field: "language".into(),
            referenced: eng.id,
        }]
    );
}

#[test]
fn an_action_cannot_be_reverted_twice() {
    let mut engine = engine();
    let alice = actor("alice");

    let mut eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    eng.set("code", "en");
    let modified = engine.save(&alice, &eng).unwrap().seq().unwrap();

    let first = engine.undo(&alice, modified).unwrap();
    let reverting = first.action().unwrap();

    let second = engine.undo(&alice, modified).unwrap();
    let UndoOutcome::Blocked { revertibility } = second else {
        panic!("expected the second undo to be blocked");
    };
    assert_eq!(
        revertibility.blocks(),
        &[UndoBlock::AlreadyReverted { by: reverting }]
    );
}

#[test]
fn batch_undo_reports_per_action_outcomes() {
    let mut engine = engine();
    let alice = actor("alice");

    let mut eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    eng.set("code", "en");
    let modified = engine.save(&alice, &eng).unwrap().seq().unwrap();

    let reports = engine.undo_batch(&alice, &[modified, modified, Seq::new(999)]);
    assert_eq!(reports.len(), 3);

    assert!(reports[0].outcome.as_ref().unwrap().is_undone());
    match reports[1].outcome.as_ref().unwrap() {
        UndoOutcome::Blocked { revertibility } => {
            assert!(matches!(
                revertibility.blocks(),
                [UndoBlock::AlreadyReverted { .. }]
            ));
        }
        other => panic!("expected a blocked report, got {other:?}"),
    }
    assert!(reports[2].outcome.is_err());

    // Partial success: the first undo stuck.
    let view = engine.machine(eng.id).unwrap();
    assert_eq!(view.get("code"), Some(&FieldValue::from("eng")));
}

#[test]
fn undo_modify_with_values_already_restored_reports_no_effect() {
    let mut engine = engine();
    let alice = actor("alice");

    let mut eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    eng.set("code", "en");
    let modified = engine.save(&alice, &eng).unwrap().seq().unwrap();
    // Manually put the old value back.
    eng.set("code", "eng");
    engine.save(&alice, &eng).unwrap();

    let outcome = engine.undo(&alice, modified).unwrap();
    let UndoOutcome::Blocked { revertibility } = outcome else {
        panic!("expected a no-effect block");
    };
    assert_eq!(revertibility.blocks(), &[UndoBlock::NoEffect]);
    assert!(engine.ledger().action(modified).unwrap().reverted_by.is_none());
}
