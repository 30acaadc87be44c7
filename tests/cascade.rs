//! Delete cascades: ordering, depth, and cycle termination.

mod fixtures;

use fixtures::{actor, concept, connection, engine, language, word};
use retrace::{ActionKind, FieldSpec, ObjectId, ObjectRecord, ObjectStore, TypeManifest};

#[test]
fn dependent_deletes_precede_the_target() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let dog = word("dog", eng.id);
    engine.save(&alice, &dog).unwrap();

    let seqs = engine.delete(&alice, eng.id).unwrap();
    assert_eq!(seqs.len(), 2);

    let subjects: Vec<ObjectId> = seqs
        .iter()
        .map(|seq| engine.ledger().action(*seq).unwrap().subject)
        .collect();
    assert_eq!(subjects, vec![dog.id, eng.id]);

    // Callers rely on "most recent action == root of the cascade".
    let newest = engine.actions().next().unwrap();
    assert_eq!(newest.subject, eng.id);
    assert_eq!(newest.kind, ActionKind::Delete);

    assert!(!engine.machine(dog.id).unwrap().exists());
    assert!(!engine.store().contains(&dog.id));
    assert!(!engine.store().contains(&eng.id));
}

#[test]
fn cascade_recurses_through_transitive_referrers() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let dog = word("dog", eng.id);
    engine.save(&alice, &dog).unwrap();
    let hound = word("hound", eng.id);
    engine.save(&alice, &hound).unwrap();
    let canine = concept("canine");
    engine.save(&alice, &canine).unwrap();
    let join = connection(dog.id, canine.id);
    engine.save(&alice, &join).unwrap();

    let seqs = engine.delete(&alice, eng.id).unwrap();
    let subjects: Vec<ObjectId> = seqs
        .iter()
        .map(|seq| engine.ledger().action(*seq).unwrap().subject)
        .collect();

    // Both words and the join row go; each dependent strictly before the
    // object it references, the language last.
    assert_eq!(subjects.len(), 4);
    assert_eq!(*subjects.last().unwrap(), eng.id);
    let pos = |id: ObjectId| subjects.iter().position(|s| *s == id).unwrap();
    assert!(pos(join.id) < pos(dog.id));
    assert!(pos(dog.id) < pos(eng.id));
    assert!(pos(hound.id) < pos(eng.id));

    // The concept references nothing and survives.
    assert!(engine.machine(canine.id).unwrap().exists());

    let tombstones = engine.ledger().deletion_commits();
    assert_eq!(tombstones.len(), 4);
}

#[test]
fn cyclic_references_terminate() {
    let mut engine = engine();
    let alice = actor("alice");

    let manifest = TypeManifest::new(
        fixtures::type_name("node"),
        vec![FieldSpec::foreign_key("peer")],
    );
    let mut manifests = fixtures::manifests();
    manifests.push(manifest);
    assert!(engine.register_schema(&manifests));

    let a_id = ObjectId::random();
    let b_id = ObjectId::random();
    let a = ObjectRecord::new(a_id, fixtures::type_name("node")).with("peer", b_id);
    let b = ObjectRecord::new(b_id, fixtures::type_name("node")).with("peer", a_id);
    engine.save(&alice, &a).unwrap();
    engine.save(&alice, &b).unwrap();

    let seqs = engine.delete(&alice, a_id).unwrap();
    assert_eq!(seqs.len(), 2);
    let last = engine.ledger().action(*seqs.last().unwrap()).unwrap();
    assert_eq!(last.subject, a_id);
    assert!(!engine.machine(a_id).unwrap().exists());
    assert!(!engine.machine(b_id).unwrap().exists());
}

#[test]
fn store_failure_mid_cascade_records_nothing_for_unapplied_members() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    let dog = word("dog", eng.id);
    engine.save(&alice, &dog).unwrap();
    let len = engine.ledger().len();

    // The dependent's row vanished out-of-band, so its store deletion fails.
    engine.store_mut().delete(&dog.id).unwrap();
    assert!(engine.delete(&alice, eng.id).is_err());

    // No tombstone without its store effect: the ledger did not move, and
    // the target still exists in both places.
    assert_eq!(engine.ledger().len(), len);
    assert!(engine.machine(eng.id).unwrap().exists());
    assert!(engine.machine(dog.id).unwrap().exists());
    assert!(engine.store().contains(&eng.id));
}

#[test]
fn deleting_a_dead_object_is_rejected() {
    let mut engine = engine();
    let alice = actor("alice");

    let eng = language("eng");
    engine.save(&alice, &eng).unwrap();
    engine.delete(&alice, eng.id).unwrap();

    assert!(engine.delete(&alice, eng.id).is_err());
    assert!(engine.delete(&alice, ObjectId::random()).is_err());
}
